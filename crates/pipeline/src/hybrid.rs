//! Stage orchestration: retrieval first, web augmentation on request,
//! general knowledge as the fallback.
//!
//! The invariant this module protects: augmentation and fallback may add
//! to an answer, never degrade it. A weak or failed web pass returns the
//! retrieval answer untouched (with a visible notice on failure), and a
//! failed retrieval pass falls back to an ungrounded answer instead of an
//! error.

use crate::general::{GeneralAssistant, GeneralOptions};
use crate::web::WebSearchAssistant;
use chrono::Datelike;
use docent_cache::AnswerCache;
use docent_core::{AnswerResult, AppError, AppResult, Message, SourceBundle};
use docent_retrieval::{AnswerOptions, DocumentAssistant};
use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Web outcomes below this confidence are discarded.
const MIN_WEB_CONFIDENCE: f32 = 0.3;

/// Web outcomes shorter than this are discarded.
const MIN_WEB_ANSWER_CHARS: usize = 100;

/// Prefix length of the base answer mixed into the enhancement cache key.
const ENHANCEMENT_KEY_ANSWER_PREFIX: usize = 200;

/// Notice appended when web augmentation was requested but unavailable.
const WEB_UNAVAILABLE_NOTICE: &str =
    "Note: web sources were unavailable, so this answer draws on your documents only.";

/// Per-question options for [`HybridOrchestrator::answer`].
#[derive(Debug, Clone, Default)]
pub struct HybridOptions {
    pub conversation_id: Option<Uuid>,
    pub history: Vec<Message>,
    pub system_instruction: Option<String>,
    pub cached_context: Option<String>,
    pub require_web_augmentation: bool,
}

/// Stage time budgets.
#[derive(Debug, Clone, Copy)]
pub struct StageBudgets {
    pub retrieval: Duration,
    pub web: Duration,
    pub fallback: Duration,
}

impl Default for StageBudgets {
    fn default() -> Self {
        Self {
            retrieval: Duration::from_secs(60),
            web: Duration::from_secs(60),
            fallback: Duration::from_secs(30),
        }
    }
}

/// Chains the three answering stages.
pub struct HybridOrchestrator {
    documents: Arc<DocumentAssistant>,
    web: Arc<WebSearchAssistant>,
    general: Arc<GeneralAssistant>,
    cache: Arc<AnswerCache>,
    budgets: StageBudgets,
}

impl HybridOrchestrator {
    pub fn new(
        documents: Arc<DocumentAssistant>,
        web: Arc<WebSearchAssistant>,
        general: Arc<GeneralAssistant>,
        cache: Arc<AnswerCache>,
        budgets: StageBudgets,
    ) -> Self {
        Self {
            documents,
            web,
            general,
            cache,
            budgets,
        }
    }

    /// Answer `question` through the staged pipeline.
    pub async fn answer(&self, question: &str, options: &HybridOptions) -> AppResult<AnswerResult> {
        let base = self.base_answer(question, options).await?;

        if !options.require_web_augmentation {
            return Ok(base);
        }

        let key = enhancement_key(question, &base.answer);
        let enhanced = self
            .cache
            .enhancement(&key, || self.enhance(question, base.clone()))
            .await;

        match enhanced {
            Ok(result) => Ok(result),
            // Failures propagate out of the generator uncached, so the next
            // ask retries the search instead of replaying this notice.
            Err(error) => {
                tracing::warn!(%error, "web augmentation failed, keeping the document answer");
                let annotated = format!("{}\n\n{}", base.answer, WEB_UNAVAILABLE_NOTICE);
                let sources = base.sources.unwrap_or_default();
                Ok(AnswerResult::new(base.message.conversation_id, annotated).with_sources(sources))
            }
        }
    }

    /// Retrieval under its budget; on any failure, the general fallback
    /// under its own budget.
    async fn base_answer(
        &self,
        question: &str,
        options: &HybridOptions,
    ) -> AppResult<AnswerResult> {
        let answer_options = AnswerOptions {
            conversation_id: options.conversation_id,
            history: options.history.clone(),
            system_instruction: options.system_instruction.clone(),
        };
        let retrieval = with_timeout(
            self.budgets.retrieval,
            "document retrieval",
            self.documents.answer_question(question, &answer_options),
        )
        .await;

        match retrieval {
            Ok(result) => Ok(result),
            Err(error) => {
                tracing::warn!(%error, "document retrieval failed, falling back to general knowledge");
                let general_options = GeneralOptions {
                    conversation_id: options.conversation_id,
                    history: options.history.clone(),
                    system_instruction: options.system_instruction.clone(),
                    cached_context: options.cached_context.clone(),
                };
                with_timeout(
                    self.budgets.fallback,
                    "general fallback",
                    self.general.answer(question, &general_options),
                )
                .await
            }
        }
    }

    /// Run the web pass over a base answer. Weak outcomes resolve to the
    /// base answer; search failures propagate so they are never cached.
    async fn enhance(&self, question: &str, base: AnswerResult) -> AppResult<AnswerResult> {
        let prompt = enhancement_prompt(question, &base.answer);
        let conversation_id = base.message.conversation_id;

        let outcome = with_timeout(
            self.budgets.web,
            "web augmentation",
            self.web.search(&prompt, None),
        )
        .await?;

        if outcome.confidence < MIN_WEB_CONFIDENCE
            || outcome.answer.chars().count() < MIN_WEB_ANSWER_CHARS
        {
            tracing::debug!(
                confidence = outcome.confidence,
                chars = outcome.answer.chars().count(),
                "web outcome below quality gate, keeping the document answer"
            );
            return Ok(base);
        }

        let document_sources = base
            .sources
            .as_ref()
            .map(|s| s.document_sources.clone())
            .unwrap_or_default();
        Ok(
            AnswerResult::new(conversation_id, outcome.answer).with_sources(SourceBundle {
                document_sources,
                web_sources: outcome.sources,
            }),
        )
    }
}

/// Cache key for one (question, base answer) enhancement.
fn enhancement_key(question: &str, base_answer: &str) -> String {
    let prefix: String = base_answer
        .chars()
        .take(ENHANCEMENT_KEY_ANSWER_PREFIX)
        .collect();
    let digest = Sha256::digest(format!("{question}::{prefix}").as_bytes());
    format!("{digest:x}")
}

fn enhancement_prompt(question: &str, base_answer: &str) -> String {
    let today = chrono::Utc::now();
    format!(
        "It is {year}-{month:02}. A user asked: {question}\n\n\
         Our internal documents answered: {base_answer}\n\n\
         Search the web for current, relevant context and fuse it with the \
         document answer into one coherent narrative. Keep every claim from \
         the document answer intact, and cite the web sources you add.",
        year = today.year(),
        month = today.month(),
    )
}

/// Bound a stage by `duration`, mapping elapsed time to a timeout error.
pub async fn with_timeout<T>(
    duration: Duration,
    label: &str,
    fut: impl Future<Output = AppResult<T>>,
) -> AppResult<T> {
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(AppError::Timeout(label.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use crate::rate_limit::RateLimiter;
    use docent_core::SystemClock;
    use docent_provider::{GenAiClient, MockClient};
    use docent_retrieval::{StoreManager, StoreRegistry, StoreSeed};
    use std::sync::atomic::Ordering;

    struct Fixture {
        orchestrator: HybridOrchestrator,
        document_client: Arc<MockClient>,
        web_client: Arc<MockClient>,
        general_client: Arc<MockClient>,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        fixture_with(StageBudgets::default(), None)
    }

    fn fixture_with(budgets: StageBudgets, document_delay: Option<Duration>) -> Fixture {
        let mut document_mock = MockClient::new();
        if let Some(delay) = document_delay {
            document_mock = document_mock.with_generate_delay(delay);
        }
        let document_client = Arc::new(document_mock);
        let web_client = Arc::new(MockClient::new());
        let general_client = Arc::new(MockClient::new());

        let dir = tempfile::tempdir().unwrap();
        let registry = StoreRegistry::new(dir.path().join("registry.json"));
        let stores = Arc::new(StoreManager::new(
            Arc::clone(&document_client) as Arc<dyn GenAiClient>,
            registry,
            vec![StoreSeed {
                display_name: "docs".to_string(),
                files: vec![],
                existing_name: None,
            }],
        ));

        let documents = Arc::new(DocumentAssistant::new(
            Arc::clone(&document_client) as Arc<dyn GenAiClient>,
            stores,
            "gemini-2.5-pro",
        ));
        let web = Arc::new(WebSearchAssistant::new(
            Arc::clone(&web_client) as Arc<dyn GenAiClient>,
            "gemini-2.0-flash",
            Arc::new(RateLimiter::new(100, Duration::ZERO)),
        ));
        let general = Arc::new(GeneralAssistant::new(
            Arc::clone(&general_client) as Arc<dyn GenAiClient>,
            "gemini-2.0-flash",
        ));
        let cache = Arc::new(AnswerCache::new(
            ChronoDuration::hours(1),
            ChronoDuration::minutes(30),
            ChronoDuration::minutes(30),
            Arc::new(SystemClock),
        ));

        Fixture {
            orchestrator: HybridOrchestrator::new(documents, web, general, cache, budgets),
            document_client,
            web_client,
            general_client,
            _dir: dir,
        }
    }

    fn long_web_answer() -> String {
        format!(
            "Current reporting adds important context to the policy. {}",
            "More detail. ".repeat(20)
        )
    }

    #[tokio::test]
    async fn test_retrieval_only_when_web_not_required() {
        let f = fixture();
        f.document_client.push_response(MockClient::grounded_response(
            "Twenty days of annual leave.",
            &[("policy.txt", "Employees accrue twenty days.")],
        ));

        let result = f
            .orchestrator
            .answer("How much leave do I get?", &HybridOptions::default())
            .await
            .unwrap();

        assert_eq!(result.answer, "Twenty days of annual leave.");
        assert_eq!(f.web_client.generate_calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.general_client.generate_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_low_confidence_web_outcome_keeps_document_answer() {
        let f = fixture();
        f.document_client.push_response(MockClient::grounded_response(
            "Twenty days of annual leave.",
            &[("policy.txt", "Employees accrue twenty days.")],
        ));
        // One source and a long answer: confidence 0.2 + 0.1 = 0.3 would
        // pass, so give it no sources at all (confidence 0.2 max).
        f.web_client.push_response(MockClient::web_response(&long_web_answer(), &[]));

        let options = HybridOptions {
            require_web_augmentation: true,
            ..Default::default()
        };
        let result = f.orchestrator.answer("leave?", &options).await.unwrap();

        assert_eq!(result.answer, "Twenty days of annual leave.");
        let sources = result.sources.unwrap();
        assert_eq!(sources.document_sources.len(), 1);
        assert!(sources.web_sources.is_empty());
    }

    #[tokio::test]
    async fn test_accepted_web_outcome_merges_sources() {
        let f = fixture();
        f.document_client.push_response(MockClient::grounded_response(
            "Twenty days of annual leave.",
            &[("policy.txt", "Employees accrue twenty days.")],
        ));
        f.web_client.push_response(MockClient::web_response(
            &long_web_answer(),
            &[
                ("Labor law update", "https://law.example/update"),
                ("HR trends", "https://hr.example/trends"),
            ],
        ));

        let options = HybridOptions {
            require_web_augmentation: true,
            ..Default::default()
        };
        let result = f.orchestrator.answer("leave?", &options).await.unwrap();

        assert!(result.answer.starts_with("Current reporting"));
        let sources = result.sources.unwrap();
        assert_eq!(sources.document_sources.len(), 1);
        assert_eq!(sources.web_sources.len(), 2);
    }

    #[tokio::test]
    async fn test_web_failure_annotates_document_answer() {
        let f = fixture();
        f.document_client.push_response(MockClient::grounded_response(
            "Twenty days of annual leave.",
            &[("policy.txt", "Employees accrue twenty days.")],
        ));
        // Non-transient failure so no retries stretch the test
        f.web_client
            .push_failure(AppError::provider(Some(400), "tool rejected"));

        let options = HybridOptions {
            require_web_augmentation: true,
            ..Default::default()
        };
        let result = f.orchestrator.answer("leave?", &options).await.unwrap();

        assert!(result.answer.starts_with("Twenty days of annual leave."));
        assert!(result.answer.contains(WEB_UNAVAILABLE_NOTICE));
        assert_eq!(result.sources.unwrap().document_sources.len(), 1);
    }

    #[tokio::test]
    async fn test_web_failure_is_not_cached_and_next_ask_retries() {
        let f = fixture();
        for _ in 0..2 {
            f.document_client.push_response(MockClient::grounded_response(
                "Twenty days of annual leave.",
                &[("policy.txt", "Employees accrue twenty days.")],
            ));
        }
        f.web_client
            .push_failure(AppError::provider(Some(400), "tool rejected"));
        f.web_client.push_response(MockClient::web_response(
            &long_web_answer(),
            &[("Update", "https://law.example/update")],
        ));

        let options = HybridOptions {
            require_web_augmentation: true,
            ..Default::default()
        };
        let first = f.orchestrator.answer("leave?", &options).await.unwrap();
        assert!(first.answer.contains(WEB_UNAVAILABLE_NOTICE));

        // The annotated answer was not cached under the enhancement key, so
        // the same question triggers a fresh search and gets the web answer.
        let second = f.orchestrator.answer("leave?", &options).await.unwrap();
        assert!(second.answer.starts_with("Current reporting"));
        assert!(!second.answer.contains(WEB_UNAVAILABLE_NOTICE));
        assert_eq!(f.web_client.generate_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retrieval_failure_falls_back_to_general_knowledge() {
        let f = fixture();
        f.document_client
            .push_failure(AppError::provider(Some(400), "store not ready"));
        f.general_client.push_text("General best practice is twenty days.");

        let result = f
            .orchestrator
            .answer("leave?", &HybridOptions::default())
            .await
            .unwrap();

        assert_eq!(result.answer, "General best practice is twenty days.");
        assert!(result.sources.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_retrieval_times_out_into_fallback() {
        let budgets = StageBudgets {
            retrieval: Duration::from_millis(100),
            ..Default::default()
        };
        let f = fixture_with(budgets, Some(Duration::from_secs(120)));
        f.general_client.push_text("fallback answer");

        let result = f
            .orchestrator
            .answer("leave?", &HybridOptions::default())
            .await
            .unwrap();
        assert_eq!(result.answer, "fallback answer");
    }

    #[tokio::test]
    async fn test_with_timeout_maps_elapsed_to_timeout_error() {
        let err = with_timeout(Duration::from_millis(10), "document retrieval", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, AppError>(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_identical_enhancements_are_cached() {
        let f = fixture();
        for _ in 0..2 {
            f.document_client.push_response(MockClient::grounded_response(
                "Twenty days of annual leave.",
                &[("policy.txt", "Employees accrue twenty days.")],
            ));
        }
        f.web_client.push_response(MockClient::web_response(
            &long_web_answer(),
            &[("Update", "https://law.example/update")],
        ));

        let options = HybridOptions {
            require_web_augmentation: true,
            ..Default::default()
        };
        let first = f.orchestrator.answer("leave?", &options).await.unwrap();
        let second = f.orchestrator.answer("leave?", &options).await.unwrap();

        assert_eq!(first.answer, second.answer);
        // One web round-trip served both questions
        assert_eq!(f.web_client.generate_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_enhancement_key_depends_on_answer_prefix() {
        let a = enhancement_key("q", "first answer");
        let b = enhancement_key("q", "different answer");
        assert_ne!(a, b);

        // Changes past the prefix do not change the key
        let long = "x".repeat(300);
        let long_tail_changed = format!("{}{}", "x".repeat(200), "y".repeat(100));
        assert_eq!(enhancement_key("q", &long), enhancement_key("q", &long_tail_changed));
    }
}
