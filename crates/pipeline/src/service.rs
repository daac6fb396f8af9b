//! The answer service: conversation plumbing around the orchestrator.
//!
//! This is the surface callers talk to. It owns the guarantees the stages
//! below cannot make on their own: a question always yields a reply (an
//! apology at worst), messages land in the conversation history in order,
//! and personalization or cache hiccups degrade instead of failing the
//! request.

use crate::hybrid::{HybridOptions, HybridOrchestrator};
use docent_cache::{AnswerCache, UpstreamContextCache};
use docent_core::{AnswerResult, AppResult, Message};
use std::sync::Arc;
use uuid::Uuid;

/// Reply sent when the pipeline cannot produce a real answer.
const APOLOGY: &str = "I'm sorry, I wasn't able to answer that right now. Please try again in a moment.";

/// Base instruction prefixed to every per-owner system prompt.
const BASE_ANSWERING_INSTRUCTION: &str = "You are a careful assistant answering questions about the user's \
organization from its document collection. Be accurate, cite sources, and say so when you are unsure.";

/// Read access to conversations and their owners.
#[async_trait::async_trait]
pub trait ConversationStore: Send + Sync {
    async fn fetch_history(&self, conversation_id: Uuid) -> AppResult<Vec<Message>>;

    /// The user a conversation belongs to, if any.
    async fn find_owner(&self, conversation_id: Uuid) -> AppResult<Option<String>>;
}

/// Per-user personalization inputs.
#[async_trait::async_trait]
pub trait UserProfile: Send + Sync {
    async fn personalization_preset(&self, owner_id: &str) -> AppResult<Option<String>>;

    async fn communication_style_hint(&self, owner_id: &str) -> AppResult<Option<String>>;
}

/// Answers questions within conversations.
pub struct AnswerService {
    orchestrator: Arc<HybridOrchestrator>,
    cache: Arc<AnswerCache>,
    contexts: Arc<UpstreamContextCache>,
    conversations: Arc<dyn ConversationStore>,
    profiles: Arc<dyn UserProfile>,
    /// Model whose cache minimum governs upstream context provisioning
    context_model: String,
}

impl AnswerService {
    pub fn new(
        orchestrator: Arc<HybridOrchestrator>,
        cache: Arc<AnswerCache>,
        contexts: Arc<UpstreamContextCache>,
        conversations: Arc<dyn ConversationStore>,
        profiles: Arc<dyn UserProfile>,
        context_model: impl Into<String>,
    ) -> Self {
        Self {
            orchestrator,
            cache,
            contexts,
            conversations,
            profiles,
            context_model: context_model.into(),
        }
    }

    /// Answer `question` inside `conversation_id`.
    ///
    /// Never returns an error: a missing owner or a total pipeline failure
    /// resolves to an apology reply.
    pub async fn generate(
        &self,
        question: &str,
        conversation_id: Uuid,
        require_web: bool,
    ) -> AnswerResult {
        let owner_id = match self.conversations.find_owner(conversation_id).await {
            Ok(Some(owner)) => owner,
            Ok(None) => {
                tracing::warn!(%conversation_id, "conversation has no owner");
                return self.apologize(conversation_id).await;
            }
            Err(error) => {
                tracing::error!(%conversation_id, %error, "owner lookup failed");
                return self.apologize(conversation_id).await;
            }
        };

        let conversation_key = conversation_id.to_string();
        let history = self
            .cache
            .conversation_history_via(&conversation_key, || {
                self.conversations.fetch_history(conversation_id)
            })
            .await;

        self.cache
            .record_message(&conversation_key, Message::asker(conversation_id, question))
            .await;

        let system_prompt = self.system_prompt_for(&owner_id).await;
        let cached_context = self
            .contexts
            .get_or_create(&owner_id, &self.context_model, &system_prompt)
            .await;

        let options = HybridOptions {
            conversation_id: Some(conversation_id),
            history,
            system_instruction: Some(system_prompt),
            cached_context,
            require_web_augmentation: require_web,
        };

        let result = match self.orchestrator.answer(question, &options).await {
            Ok(result) => result,
            Err(error) => {
                tracing::error!(%conversation_id, %error, "answer pipeline failed");
                self.apologize(conversation_id).await
            }
        };

        self.cache
            .record_message(&conversation_key, result.message.clone())
            .await;
        result
    }

    /// Drop the owner's cached personalization after a settings change, so
    /// the next question rebuilds the system prompt and upstream context.
    pub async fn invalidate_personalization(&self, owner_id: &str) {
        self.cache.invalidate_system_prompt(owner_id).await;
        self.contexts.invalidate_owner(owner_id).await;
    }

    /// Rendered system prompt for an owner, cached per owner. Profile
    /// lookup failures degrade to the base instruction.
    async fn system_prompt_for(&self, owner_id: &str) -> String {
        let render = || async {
            let mut prompt = BASE_ANSWERING_INSTRUCTION.to_string();

            match self.profiles.personalization_preset(owner_id).await {
                Ok(Some(preset)) if !preset.trim().is_empty() => {
                    prompt.push_str("\n\n");
                    prompt.push_str(preset.trim());
                }
                Ok(_) => {}
                Err(error) => {
                    tracing::warn!(owner_id, %error, "preset lookup failed, using base prompt");
                }
            }
            match self.profiles.communication_style_hint(owner_id).await {
                Ok(Some(style)) if !style.trim().is_empty() => {
                    prompt.push_str("\n\nCommunication style: ");
                    prompt.push_str(style.trim());
                }
                Ok(_) => {}
                Err(error) => {
                    tracing::warn!(owner_id, %error, "style lookup failed, using base prompt");
                }
            }
            Ok(prompt)
        };

        match self.cache.system_prompt(owner_id, render).await {
            Ok(prompt) => prompt,
            // The renderer itself never errors, but the cache seam can
            Err(_) => BASE_ANSWERING_INSTRUCTION.to_string(),
        }
    }

    async fn apologize(&self, conversation_id: Uuid) -> AnswerResult {
        AnswerResult::new(conversation_id, APOLOGY)
    }
}
