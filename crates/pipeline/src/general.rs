//! General-knowledge answering and lightweight classification.
//!
//! This stage answers without any grounding tool. It is the fallback when
//! document retrieval fails, and it also hosts the small classification
//! calls (does this question need documents? was that answer sufficient?)
//! whose replies are parsed from a JSON object in the model text. Every
//! classification failure defaults to the safe side: retrieval needed,
//! answer insufficient.

use docent_core::{AnswerResult, AppResult, Message, Role};
use docent_provider::{retry, Content, GenAiClient, GenerateRequest, RetryPolicy};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

/// Per-call options for [`GeneralAssistant::answer`].
#[derive(Debug, Clone, Default)]
pub struct GeneralOptions {
    pub conversation_id: Option<Uuid>,
    pub history: Vec<Message>,
    pub system_instruction: Option<String>,
    /// Provider-side cached context holding the system instruction; when
    /// set, the inline instruction is omitted
    pub cached_context: Option<String>,
}

/// Ungrounded answering stage.
pub struct GeneralAssistant {
    client: Arc<dyn GenAiClient>,
    model: String,
    retry_policy: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct RetrievalVerdict {
    #[serde(default)]
    needed: bool,
}

#[derive(Debug, Deserialize)]
struct SufficiencyVerdict {
    #[serde(default)]
    sufficient: bool,
    #[serde(default)]
    reason: String,
}

impl GeneralAssistant {
    pub fn new(client: Arc<dyn GenAiClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Answer `prompt` from the model's own knowledge.
    pub async fn answer(&self, prompt: &str, options: &GeneralOptions) -> AppResult<AnswerResult> {
        let conversation_id = options.conversation_id.unwrap_or_else(Uuid::new_v4);

        let mut contents = Vec::with_capacity(options.history.len() + 1);
        for message in &options.history {
            contents.push(match message.role {
                Role::Asker => Content::user(&message.content),
                Role::Assistant => Content::model(&message.content),
            });
        }
        contents.push(Content::user(prompt));

        let mut request = GenerateRequest::new(&self.model, contents);
        if let Some(handle) = &options.cached_context {
            // The cached context already carries the system instruction
            request = request.with_cached_content(handle);
        } else if let Some(instruction) = &options.system_instruction {
            request = request.with_system_instruction(instruction);
        }

        let response = retry(&self.retry_policy, "general answer", || {
            self.client.generate(&request)
        })
        .await?;

        if let Some(cached) = response
            .usage_metadata
            .and_then(|u| u.cached_content_token_count)
        {
            tracing::debug!(cached_tokens = cached, "served from upstream cached context");
        }

        let answer = response.extract_text()?;
        Ok(AnswerResult::new(conversation_id, answer))
    }

    /// Whether `question` needs the document stores to answer well.
    /// Defaults to `true` whenever the classification cannot be trusted.
    pub async fn needs_retrieval(&self, question: &str) -> bool {
        let prompt = format!(
            "Does answering the question below require consulting the user's \
             internal documents (policies, handbooks, contracts), as opposed \
             to general knowledge? Reply with only a JSON object: \
             {{\"needed\": true|false}}.\n\nQuestion: {question}"
        );
        let request = GenerateRequest::new(&self.model, vec![Content::user(prompt)]);

        match self.client.generate(&request).await {
            Ok(response) => match response.extract_text() {
                Ok(text) => parse_json_object::<RetrievalVerdict>(&text)
                    .map(|v| v.needed)
                    .unwrap_or(true),
                Err(_) => true,
            },
            Err(error) => {
                tracing::warn!(%error, "retrieval classification failed, assuming needed");
                true
            }
        }
    }

    /// Whether `answer` sufficiently addresses `question`, with the model's
    /// reasoning. Defaults to insufficient whenever the classification
    /// cannot be trusted.
    pub async fn judge_sufficiency(&self, question: &str, answer: &str) -> (bool, String) {
        let prompt = format!(
            "Judge whether the answer fully addresses the question. Reply \
             with only a JSON object: {{\"sufficient\": true|false, \
             \"reason\": \"...\"}}.\n\nQuestion: {question}\n\nAnswer: {answer}"
        );
        let request = GenerateRequest::new(&self.model, vec![Content::user(prompt)]);

        let fallback = || (false, "sufficiency could not be judged".to_string());
        match self.client.generate(&request).await {
            Ok(response) => match response.extract_text() {
                Ok(text) => parse_json_object::<SufficiencyVerdict>(&text)
                    .map(|v| (v.sufficient, v.reason))
                    .unwrap_or_else(fallback),
                Err(_) => fallback(),
            },
            Err(error) => {
                tracing::warn!(%error, "sufficiency judgement failed, assuming insufficient");
                fallback()
            }
        }
    }
}

/// Parse the first JSON object embedded in model text, tolerating prose or
/// code fences around it.
fn parse_json_object<T: serde::de::DeserializeOwned>(text: &str) -> Option<T> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use docent_provider::MockClient;

    #[test]
    fn test_parse_json_object_tolerates_fences_and_prose() {
        let text = "Sure! Here is my verdict:\n```json\n{\"needed\": true}\n```";
        let verdict: RetrievalVerdict = parse_json_object(text).unwrap();
        assert!(verdict.needed);

        assert!(parse_json_object::<RetrievalVerdict>("no json here").is_none());
    }

    #[tokio::test]
    async fn test_cached_context_omits_inline_instruction() {
        let client = Arc::new(MockClient::new());
        let assistant = GeneralAssistant::new(
            Arc::clone(&client) as Arc<dyn GenAiClient>,
            "gemini-2.0-flash",
        );

        let options = GeneralOptions {
            system_instruction: Some("long personalization preamble".to_string()),
            cached_context: Some("cachedContents/abc".to_string()),
            ..Default::default()
        };
        assistant.answer("hello", &options).await.unwrap();

        let request = client.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(request.cached_content.as_deref(), Some("cachedContents/abc"));
        assert!(request.system_instruction.is_none());
    }

    #[tokio::test]
    async fn test_needs_retrieval_parses_verdict() {
        let client = Arc::new(MockClient::new());
        client.push_text("{\"needed\": false}");
        let assistant = GeneralAssistant::new(client, "gemini-2.0-flash");
        assert!(!assistant.needs_retrieval("what is 2+2?").await);
    }

    #[tokio::test]
    async fn test_needs_retrieval_defaults_true_on_garbage() {
        let client = Arc::new(MockClient::new().with_default_text("not json at all"));
        let assistant = GeneralAssistant::new(client, "gemini-2.0-flash");
        assert!(assistant.needs_retrieval("what is our leave policy?").await);
    }

    #[tokio::test]
    async fn test_judge_sufficiency_defaults_insufficient_on_failure() {
        let client = Arc::new(MockClient::new());
        client.push_failure(docent_core::AppError::provider(Some(400), "bad request"));
        let assistant = GeneralAssistant::new(client, "gemini-2.0-flash");

        let (sufficient, reason) = assistant.judge_sufficiency("q", "a").await;
        assert!(!sufficient);
        assert!(!reason.is_empty());
    }

    #[tokio::test]
    async fn test_judge_sufficiency_parses_verdict() {
        let client = Arc::new(MockClient::new());
        client.push_text("{\"sufficient\": true, \"reason\": \"covers all parts\"}");
        let assistant = GeneralAssistant::new(client, "gemini-2.0-flash");

        let (sufficient, reason) = assistant.judge_sufficiency("q", "a").await;
        assert!(sufficient);
        assert_eq!(reason, "covers all parts");
    }
}
