//! Registry of provider-side cached contexts.
//!
//! Large reusable prompt prefixes (per-owner system prompts) are worth
//! caching on the provider side so repeated requests do not resubmit and
//! re-tokenize the same text. This module keeps a local record per owner,
//! keyed by a content hash so a changed prompt provisions a fresh upstream
//! cache, and skips provisioning entirely when the content is below the
//! model's minimum cacheable size.

use crate::entry::CacheEntry;
use crate::keyed_mutex::KeyedMutex;
use chrono::{DateTime, Duration, Utc};
use docent_core::Clock;
use docent_provider::{CachedContextInfo, GenAiClient};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Local mirror of one provider-side cached context.
#[derive(Debug, Clone)]
pub struct UpstreamCacheRecord {
    /// Provider handle, e.g. `cachedContents/abc123`
    pub cache_name: String,
    pub owner_id: String,
    pub content_hash: String,
    pub expires_at: DateTime<Utc>,
    pub token_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextCacheStats {
    pub records: usize,
    pub cached_tokens: u64,
}

/// Per-owner registry of upstream cached contexts.
pub struct UpstreamContextCache {
    client: Arc<dyn GenAiClient>,
    records: RwLock<HashMap<String, CacheEntry<UpstreamCacheRecord>>>,
    mutex: KeyedMutex,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl UpstreamContextCache {
    pub fn new(client: Arc<dyn GenAiClient>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            client,
            records: RwLock::new(HashMap::new()),
            mutex: KeyedMutex::new(),
            ttl,
            clock,
        }
    }

    /// Return the upstream cache handle for this owner's content,
    /// provisioning one if needed.
    ///
    /// Returns `None` when the content is too small for the model's cache
    /// minimum or when provisioning fails; the caller sends the content
    /// inline in that case. A provisioning failure leaves no record, so the
    /// next request retries.
    pub async fn get_or_create(
        &self,
        owner_id: &str,
        model: &str,
        content: &str,
    ) -> Option<String> {
        let tokens = estimate_tokens(content);
        let minimum = min_cacheable_tokens(model);
        if tokens < minimum {
            tracing::debug!(
                owner_id,
                model,
                tokens,
                minimum,
                "content below cache minimum, sending inline"
            );
            return None;
        }

        let hash = content_hash(content);
        if let Some(name) = self.live_handle(owner_id, &hash).await {
            return Some(name);
        }

        let _guard = self.mutex.lock(owner_id).await;
        if let Some(name) = self.live_handle(owner_id, &hash).await {
            return Some(name);
        }

        // Content changed or expired locally: drop the old upstream cache
        // before provisioning its replacement.
        let stale = {
            let mut records = self.records.write().await;
            records.remove(owner_id)
        };
        if let Some(stale) = stale {
            self.delete_upstream(&stale.value.cache_name).await;
        }

        let ttl_secs = self.ttl.num_seconds().max(0) as u64;
        let info = match self
            .client
            .create_cached_context(model, content, ttl_secs)
            .await
        {
            Ok(info) => info,
            Err(error) => {
                tracing::warn!(
                    owner_id,
                    model,
                    %error,
                    "upstream context caching failed, sending content inline"
                );
                return None;
            }
        };

        let now = self.clock.now();
        // Mirror the provider's expiry when it reports one; it may clamp the
        // requested TTL, and the local record must not outlive the upstream.
        let expires_at = match upstream_expiry(&info) {
            Some(upstream) => upstream.min(now + self.ttl),
            None => now + self.ttl,
        };
        let record = UpstreamCacheRecord {
            cache_name: info.name.clone(),
            owner_id: owner_id.to_string(),
            content_hash: hash,
            expires_at,
            token_count: info.token_count,
        };
        tracing::info!(
            owner_id,
            cache_name = %record.cache_name,
            tokens = ?record.token_count,
            expires_at = %expires_at,
            "provisioned upstream cached context"
        );
        let mut records = self.records.write().await;
        records.insert(
            owner_id.to_string(),
            CacheEntry::new(record, now, expires_at),
        );
        Some(info.name)
    }

    async fn live_handle(&self, owner_id: &str, hash: &str) -> Option<String> {
        let now = self.clock.now();
        let records = self.records.read().await;
        records
            .get(owner_id)
            .filter(|entry| !entry.is_expired(now) && entry.value.content_hash == hash)
            .map(|entry| entry.value.cache_name.clone())
    }

    /// Drop the owner's record and best-effort delete the upstream cache.
    pub async fn invalidate_owner(&self, owner_id: &str) -> bool {
        let removed = {
            let mut records = self.records.write().await;
            records.remove(owner_id)
        };
        match removed {
            Some(entry) => {
                self.delete_upstream(&entry.value.cache_name).await;
                true
            }
            None => false,
        }
    }

    async fn delete_upstream(&self, cache_name: &str) {
        if let Err(error) = self.client.delete_cached_context(cache_name).await {
            // The provider expires it on its own; losing the delete is fine.
            tracing::warn!(cache_name, %error, "failed to delete upstream cached context");
        }
    }

    /// Drop locally expired records; the provider expires its side itself.
    pub async fn sweep(&self) -> usize {
        let now = self.clock.now();
        let removed = {
            let mut records = self.records.write().await;
            let before = records.len();
            records.retain(|_, entry| !entry.is_expired(now));
            before - records.len()
        };
        self.mutex.prune().await;
        removed
    }

    pub async fn stats(&self) -> ContextCacheStats {
        let records = self.records.read().await;
        ContextCacheStats {
            records: records.len(),
            cached_tokens: records
                .values()
                .map(|entry| u64::from(entry.value.token_count.unwrap_or(0)))
                .sum(),
        }
    }
}

fn content_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    format!("{digest:x}")
}

/// Provider-reported expiry, when present and parseable.
fn upstream_expiry(info: &CachedContextInfo) -> Option<DateTime<Utc>> {
    let raw = info.expire_time.as_deref()?;
    match DateTime::parse_from_rfc3339(raw) {
        Ok(expiry) => Some(expiry.with_timezone(&Utc)),
        Err(error) => {
            tracing::warn!(cache_name = %info.name, %error, "unparseable upstream expiry");
            None
        }
    }
}

/// Rough token count: ~4 characters per token for Latin script, ~2 for
/// CJK and Hangul where each character carries more information.
pub fn estimate_tokens(content: &str) -> u32 {
    let weighted: u64 = content
        .chars()
        .map(|c| if is_cjk_or_hangul(c) { 2u64 } else { 1 })
        .sum();
    (weighted / 4).min(u64::from(u32::MAX)) as u32
}

fn is_cjk_or_hangul(c: char) -> bool {
    matches!(c,
        '\u{1100}'..='\u{11FF}'   // Hangul Jamo
        | '\u{3040}'..='\u{30FF}' // Hiragana, Katakana
        | '\u{3400}'..='\u{4DBF}' // CJK Extension A
        | '\u{4E00}'..='\u{9FFF}' // CJK Unified Ideographs
        | '\u{AC00}'..='\u{D7AF}' // Hangul Syllables
        | '\u{F900}'..='\u{FAFF}' // CJK Compatibility Ideographs
    )
}

/// Provider minimum token counts below which cached contexts are rejected.
pub fn min_cacheable_tokens(model: &str) -> u32 {
    if model.starts_with("gemini-1.5") {
        32_768
    } else if model.starts_with("gemini-2.5-pro") {
        4_096
    } else {
        // gemini-2.5-flash, gemini-2.0-flash and newer default to 1024
        1_024
    }
}
