//! In-memory collaborator implementations for the CLI and tests.

use crate::service::{ConversationStore, UserProfile};
use docent_core::{AppResult, Message};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// Conversation store held entirely in process memory.
#[derive(Default)]
pub struct InMemoryConversationStore {
    owners: Mutex<HashMap<Uuid, String>>,
    histories: Mutex<HashMap<Uuid, Vec<Message>>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_owner(&self, conversation_id: Uuid, owner_id: impl Into<String>) {
        self.owners
            .lock()
            .unwrap()
            .insert(conversation_id, owner_id.into());
    }

    pub fn push_message(&self, message: Message) {
        self.histories
            .lock()
            .unwrap()
            .entry(message.conversation_id)
            .or_default()
            .push(message);
    }
}

#[async_trait::async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn fetch_history(&self, conversation_id: Uuid) -> AppResult<Vec<Message>> {
        Ok(self
            .histories
            .lock()
            .unwrap()
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn find_owner(&self, conversation_id: Uuid) -> AppResult<Option<String>> {
        Ok(self.owners.lock().unwrap().get(&conversation_id).cloned())
    }
}

/// User profile store held entirely in process memory.
#[derive(Default)]
pub struct InMemoryUserProfile {
    presets: Mutex<HashMap<String, String>>,
    styles: Mutex<HashMap<String, String>>,
}

impl InMemoryUserProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_preset(&self, owner_id: impl Into<String>, preset: impl Into<String>) {
        self.presets
            .lock()
            .unwrap()
            .insert(owner_id.into(), preset.into());
    }

    pub fn set_style(&self, owner_id: impl Into<String>, style: impl Into<String>) {
        self.styles
            .lock()
            .unwrap()
            .insert(owner_id.into(), style.into());
    }
}

#[async_trait::async_trait]
impl UserProfile for InMemoryUserProfile {
    async fn personalization_preset(&self, owner_id: &str) -> AppResult<Option<String>> {
        Ok(self.presets.lock().unwrap().get(owner_id).cloned())
    }

    async fn communication_style_hint(&self, owner_id: &str) -> AppResult<Option<String>> {
        Ok(self.styles.lock().unwrap().get(owner_id).cloned())
    }
}
