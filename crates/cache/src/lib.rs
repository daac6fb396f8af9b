//! Caching for the Docent answering pipeline.
//!
//! Two independent concerns live here:
//! - [`SingleFlightCache`] / [`AnswerCache`]: process-local TTL caches with
//!   single-flight generation, so concurrent misses on one key never run the
//!   expensive generator more than once.
//! - [`UpstreamContextCache`]: local registry of provider-side cached
//!   context blobs, mirroring their expiry to avoid resubmitting large
//!   reusable prompt prefixes.

pub mod answer_cache;
pub mod context_cache;
pub mod entry;
pub mod keyed_mutex;
pub mod single_flight;

pub use answer_cache::{AnswerCache, AnswerCacheStats};
pub use context_cache::{ContextCacheStats, UpstreamCacheRecord, UpstreamContextCache};
pub use entry::CacheEntry;
pub use keyed_mutex::KeyedMutex;
pub use single_flight::SingleFlightCache;
