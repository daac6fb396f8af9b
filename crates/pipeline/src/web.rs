//! Web-grounded answering with confidence scoring.

use crate::rate_limit::RateLimiter;
use docent_core::{AppError, AppResult, WebSource};
use docent_provider::{retry, Content, GenAiClient, GenerateRequest, GroundingTool, RetryPolicy};
use std::sync::Arc;

/// Phrases that mark an answer as "nothing found"; such answers are capped
/// at low confidence no matter how long they are.
const NOT_FOUND_SIGNATURES: &[&str] = &[
    "could not find",
    "couldn't find",
    "unable to find",
    "no information",
    "no relevant results",
    "not found",
];

/// Result of one web search round-trip.
#[derive(Debug, Clone)]
pub struct WebSearchOutcome {
    pub answer: String,
    pub sources: Vec<WebSource>,
    pub confidence: f32,
}

/// Answers queries grounded in live web search results.
pub struct WebSearchAssistant {
    client: Arc<dyn GenAiClient>,
    model: String,
    rate_limiter: Arc<RateLimiter>,
    retry_policy: RetryPolicy,
}

impl WebSearchAssistant {
    pub fn new(
        client: Arc<dyn GenAiClient>,
        model: impl Into<String>,
        rate_limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            rate_limiter,
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Run `query` against web search and score the result.
    ///
    /// Waits for the rate limiter before every upstream attempt batch, and
    /// retries transient failures.
    pub async fn search(
        &self,
        query: &str,
        system_instruction: Option<&str>,
    ) -> AppResult<WebSearchOutcome> {
        self.rate_limiter.acquire().await;

        let mut request = GenerateRequest::new(&self.model, vec![Content::user(query)])
            .with_tool(GroundingTool::WebSearch);
        if let Some(instruction) = system_instruction {
            request = request.with_system_instruction(instruction);
        }

        let response = retry(&self.retry_policy, "web search", || {
            self.client.generate(&request)
        })
        .await?;

        let answer = response.joined_text();
        if answer.is_empty() {
            return Err(AppError::Web(
                "web search returned no answer text".to_string(),
            ));
        }

        let sources = collect_web_sources(&response);
        let confidence = score_confidence(&answer, sources.len());
        tracing::debug!(
            sources = sources.len(),
            confidence,
            chars = answer.chars().count(),
            "web answer produced"
        );

        Ok(WebSearchOutcome {
            answer,
            sources,
            confidence,
        })
    }
}

/// Deduplicate web grounding chunks by URL, keeping first-seen order.
fn collect_web_sources(response: &docent_provider::GenerateResponse) -> Vec<WebSource> {
    let mut sources: Vec<WebSource> = Vec::new();
    for chunk in response.grounding_chunks() {
        let Some(web) = &chunk.web else {
            continue;
        };
        let Some(url) = web.uri.as_deref().map(str::trim).filter(|u| !u.is_empty()) else {
            continue;
        };
        if sources.iter().any(|s| s.url == url) {
            continue;
        }
        sources.push(WebSource {
            title: web
                .title
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .unwrap_or("Untitled")
                .to_string(),
            url: url.to_string(),
            snippet: web.snippet.clone(),
        });
    }
    sources
}

/// Heuristic answer confidence in [0, 1].
///
/// Each cited source adds 0.2 up to 0.6; answers longer than 200 and 500
/// characters earn 0.1 each. Explicit not-found language caps the score at
/// 0.3 regardless of length or citations.
pub fn score_confidence(answer: &str, source_count: usize) -> f32 {
    let mut score = (source_count as f32 * 0.2).min(0.6);
    let chars = answer.chars().count();
    if chars > 200 {
        score += 0.1;
    }
    if chars > 500 {
        score += 0.1;
    }

    let lowered = answer.to_lowercase();
    if NOT_FOUND_SIGNATURES.iter().any(|s| lowered.contains(s)) {
        score = score.min(0.3);
    }

    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docent_provider::MockClient;
    use std::time::Duration;

    fn assistant(client: Arc<MockClient>) -> WebSearchAssistant {
        let limiter = Arc::new(RateLimiter::new(100, Duration::ZERO));
        WebSearchAssistant::new(client, "gemini-2.0-flash", limiter)
    }

    #[test]
    fn test_confidence_scales_with_sources_and_length() {
        assert_eq!(score_confidence("short", 0), 0.0);
        assert_eq!(score_confidence("short", 1), 0.2);
        // Source contribution saturates at 0.6
        assert_eq!(score_confidence("short", 5), 0.6);

        let medium = "m".repeat(250);
        assert!((score_confidence(&medium, 3) - 0.7).abs() < 1e-6);
        let long = "l".repeat(600);
        assert!((score_confidence(&long, 3) - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_not_found_language_caps_confidence() {
        let long_but_empty = format!(
            "I searched extensively but could not find any information about this. {}",
            "filler ".repeat(100)
        );
        assert!(score_confidence(&long_but_empty, 5) <= 0.3);
    }

    #[tokio::test]
    async fn test_sources_deduplicated_and_untitled_defaulted() {
        let client = Arc::new(MockClient::new());
        client.push_response(MockClient::web_response(
            "Recent coverage says rates held steady.",
            &[
                ("Reuters", "https://reuters.example/rates"),
                ("", "https://blog.example/post"),
                ("Reuters again", "https://reuters.example/rates"),
            ],
        ));

        let outcome = assistant(client).search("rate decision", None).await.unwrap();
        assert_eq!(outcome.sources.len(), 2);
        assert_eq!(outcome.sources[0].title, "Reuters");
        assert_eq!(outcome.sources[1].title, "Untitled");
    }

    #[tokio::test]
    async fn test_empty_answer_is_an_error() {
        let client = Arc::new(MockClient::new().with_default_text(""));
        let err = assistant(client).search("anything", None).await.unwrap_err();
        assert!(matches!(err, AppError::Web(_) | AppError::Provider { .. }));
    }
}
