//! Document-grounded question answering.

use crate::citations::extract_citations;
use crate::store::StoreManager;
use docent_core::{AnswerResult, AppError, AppResult, Message, Role, SourceBundle};
use docent_provider::{retry, Content, GenAiClient, GenerateRequest, GroundingTool, RetryPolicy};
use std::sync::Arc;
use uuid::Uuid;

/// Standing instruction for the retrieval stage: answers must come from the
/// indexed documents and name the files they came from.
const GROUNDING_INSTRUCTION: &str = "Answer using only the documents available through file search. \
Quote or paraphrase the relevant passages and name the source file for every claim. \
If the documents do not contain the answer, say so plainly instead of guessing.";

/// Per-call options for [`DocumentAssistant::answer_question`].
#[derive(Debug, Clone, Default)]
pub struct AnswerOptions {
    pub conversation_id: Option<Uuid>,
    pub history: Vec<Message>,
    pub system_instruction: Option<String>,
}

/// Answers questions grounded in the provisioned document stores.
pub struct DocumentAssistant {
    client: Arc<dyn GenAiClient>,
    stores: Arc<StoreManager>,
    model: String,
    retry_policy: RetryPolicy,
}

impl DocumentAssistant {
    pub fn new(
        client: Arc<dyn GenAiClient>,
        stores: Arc<StoreManager>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            stores,
            model: model.into(),
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Answer `question` from the document stores.
    ///
    /// The stores are provisioned on first use. Transient provider failures
    /// are retried; a response without any text is an error.
    pub async fn answer_question(
        &self,
        question: &str,
        options: &AnswerOptions,
    ) -> AppResult<AnswerResult> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AppError::Retrieval("question must not be blank".to_string()));
        }

        let store_handles = self.stores.prepare().await?;
        let conversation_id = options.conversation_id.unwrap_or_else(Uuid::new_v4);

        let request = self.build_request(question, options, store_handles);
        let response = retry(&self.retry_policy, "document answer", || {
            self.client.generate(&request)
        })
        .await?;

        let answer = response.extract_text()?;
        let document_sources = extract_citations(&response);
        tracing::debug!(
            sources = document_sources.len(),
            chars = answer.len(),
            "document answer produced"
        );

        Ok(AnswerResult::new(conversation_id, answer).with_sources(SourceBundle {
            document_sources,
            web_sources: Vec::new(),
        }))
    }

    fn build_request(
        &self,
        question: &str,
        options: &AnswerOptions,
        store_handles: Vec<String>,
    ) -> GenerateRequest {
        let mut instruction = GROUNDING_INSTRUCTION.to_string();
        if let Some(extra) = options
            .system_instruction
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            instruction.push_str("\n\n");
            instruction.push_str(extra);
        }

        let mut contents = Vec::with_capacity(options.history.len() + 2);
        contents.push(Content::user(instruction));
        for message in &options.history {
            contents.push(match message.role {
                Role::Asker => Content::user(&message.content),
                Role::Assistant => Content::model(&message.content),
            });
        }
        contents.push(Content::user(question));

        GenerateRequest::new(&self.model, contents)
            .with_tool(GroundingTool::DocumentStores(store_handles))
    }
}
