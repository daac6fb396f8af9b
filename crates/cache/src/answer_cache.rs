//! Process-local caches for the answering pipeline.
//!
//! Three keyed caches with different TTLs:
//! - system prompts: one rendered prompt per document owner, 1 hour
//! - conversation histories: message lists per conversation, 30 minutes,
//!   sliding expiry on append
//! - enhancements: finished web-augmented answers, 30 minutes, single-flight
//!   so concurrent identical questions pay for one upstream round-trip

use crate::single_flight::SingleFlightCache;
use chrono::Duration;
use docent_core::{AnswerResult, AppResult, Clock, Message};
use std::future::Future;
use std::sync::Arc;

/// Entry counts per store, for the stats command and logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerCacheStats {
    pub system_prompts: usize,
    pub conversations: usize,
    pub enhancements: usize,
}

/// Facade over the pipeline's local caches.
pub struct AnswerCache {
    system_prompts: SingleFlightCache<String>,
    conversations: SingleFlightCache<Vec<Message>>,
    enhancements: SingleFlightCache<AnswerResult>,
}

impl AnswerCache {
    pub fn new(
        system_prompt_ttl: Duration,
        conversation_ttl: Duration,
        enhancement_ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            system_prompts: SingleFlightCache::new(system_prompt_ttl, Arc::clone(&clock)),
            conversations: SingleFlightCache::new(conversation_ttl, Arc::clone(&clock)),
            enhancements: SingleFlightCache::new(enhancement_ttl, clock),
        }
    }

    /// Fetch or render the system prompt for a document owner.
    pub async fn system_prompt<F, Fut>(&self, owner_id: &str, render: F) -> AppResult<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<String>>,
    {
        self.system_prompts.get_or_create(owner_id, render).await
    }

    /// Drop the cached system prompt for an owner, e.g. after their
    /// document set changes.
    pub async fn invalidate_system_prompt(&self, owner_id: &str) -> bool {
        self.system_prompts.invalidate(owner_id).await
    }

    /// Cached history for a conversation; empty when cold or expired.
    pub async fn conversation_history(&self, conversation_id: &str) -> Vec<Message> {
        self.conversations
            .get(conversation_id)
            .await
            .unwrap_or_default()
    }

    /// Cached history, fetching through `fetch` on a cold conversation.
    /// A failed fetch degrades to empty history; history plumbing must
    /// never fail an answer request.
    pub async fn conversation_history_via<F, Fut>(
        &self,
        conversation_id: &str,
        fetch: F,
    ) -> Vec<Message>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<Vec<Message>>>,
    {
        match self.conversations.get_or_create(conversation_id, fetch).await {
            Ok(history) => history,
            Err(error) => {
                tracing::warn!(conversation_id, %error, "history fetch failed, continuing without it");
                Vec::new()
            }
        }
    }

    /// Record a message, extending the conversation's expiry. Starts a fresh
    /// entry when the conversation is cold.
    pub async fn record_message(&self, conversation_id: &str, message: Message) {
        if self.conversations.get(conversation_id).await.is_none() {
            self.conversations
                .insert(conversation_id, vec![message])
                .await;
        } else {
            self.conversations.append(conversation_id, message).await;
        }
    }

    /// Fetch or build a web-enhanced answer, single-flight per key.
    pub async fn enhancement<F, Fut>(&self, key: &str, build: F) -> AppResult<AnswerResult>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<AnswerResult>>,
    {
        self.enhancements.get_or_create(key, build).await
    }

    /// Drop expired entries across all stores; returns total removed.
    pub async fn sweep_expired(&self) -> usize {
        self.system_prompts.sweep().await
            + self.conversations.sweep().await
            + self.enhancements.sweep().await
    }

    pub async fn stats(&self) -> AnswerCacheStats {
        AnswerCacheStats {
            system_prompts: self.system_prompts.len().await,
            conversations: self.conversations.len().await,
            enhancements: self.enhancements.len().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docent_core::{AppError, ManualClock};
    use uuid::Uuid;

    fn cache_and_clock() -> (AnswerCache, ManualClock) {
        let clock = ManualClock::default();
        let cache = AnswerCache::new(
            Duration::hours(1),
            Duration::minutes(30),
            Duration::minutes(30),
            Arc::new(clock.clone()),
        );
        (cache, clock)
    }

    #[tokio::test]
    async fn test_system_prompt_rendered_once() {
        let (cache, _clock) = cache_and_clock();

        let first = cache
            .system_prompt("owner-1", || async { Ok("prompt v1".to_string()) })
            .await
            .unwrap();
        let second = cache
            .system_prompt("owner-1", || async {
                Err(AppError::Cache("should not re-render".to_string()))
            })
            .await
            .unwrap();

        assert_eq!(first, "prompt v1");
        assert_eq!(second, "prompt v1");
    }

    #[tokio::test]
    async fn test_system_prompt_expires_after_an_hour() {
        let (cache, clock) = cache_and_clock();
        cache
            .system_prompt("owner-1", || async { Ok("v1".to_string()) })
            .await
            .unwrap();

        clock.advance(Duration::minutes(61));
        let rerendered = cache
            .system_prompt("owner-1", || async { Ok("v2".to_string()) })
            .await
            .unwrap();
        assert_eq!(rerendered, "v2");
    }

    #[tokio::test]
    async fn test_conversation_history_accumulates_in_order() {
        let (cache, _clock) = cache_and_clock();
        let conv = Uuid::new_v4();
        let key = conv.to_string();

        cache
            .record_message(&key, Message::asker(conv, "first question"))
            .await;
        cache
            .record_message(&key, Message::assistant(conv, "first answer"))
            .await;

        let history = cache.conversation_history(&key).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "first question");
        assert_eq!(history[1].content, "first answer");
    }

    #[tokio::test]
    async fn test_active_conversation_outlives_base_ttl() {
        let (cache, clock) = cache_and_clock();
        let conv = Uuid::new_v4();
        let key = conv.to_string();

        cache.record_message(&key, Message::asker(conv, "q1")).await;
        clock.advance(Duration::minutes(25));
        cache.record_message(&key, Message::asker(conv, "q2")).await;
        clock.advance(Duration::minutes(25));

        // 50 minutes since the first message, 25 since the last: still warm.
        assert_eq!(cache.conversation_history(&key).await.len(), 2);

        clock.advance(Duration::minutes(31));
        assert!(cache.conversation_history(&key).await.is_empty());
    }

    #[tokio::test]
    async fn test_stats_and_sweep() {
        let (cache, clock) = cache_and_clock();
        let conv = Uuid::new_v4();
        cache
            .record_message(&conv.to_string(), Message::asker(conv, "q"))
            .await;
        cache
            .system_prompt("owner-1", || async { Ok("p".to_string()) })
            .await
            .unwrap();

        let stats = cache.stats().await;
        assert_eq!(stats.system_prompts, 1);
        assert_eq!(stats.conversations, 1);
        assert_eq!(stats.enhancements, 0);

        clock.advance(Duration::minutes(31));
        // Conversation expired, system prompt (1h) still live
        assert_eq!(cache.sweep_expired().await, 1);
        assert_eq!(cache.stats().await.conversations, 0);
        assert_eq!(cache.stats().await.system_prompts, 1);
    }
}
