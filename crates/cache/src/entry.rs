//! Cache entry with absolute expiry.

use chrono::{DateTime, Utc};

/// A cached value with its creation and expiry times.
///
/// A read after `expires_at` must behave as a miss, never return stale data.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub value: T,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T, created_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value,
            created_at,
            expires_at,
        }
    }

    /// Whether this entry is expired at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
