//! Shared domain types for the answering pipeline.
//!
//! These are the types that cross crate boundaries: conversation messages,
//! answer results, and the normalized citation structures derived from
//! provider grounding metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who produced a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The end user asking questions
    Asker,
    /// The answering pipeline
    Assistant,
}

/// One turn in a conversation. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: Uuid,
    pub conversation_id: Uuid,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a user turn.
    pub fn asker(conversation_id: Uuid, content: impl Into<String>) -> Self {
        Self::new(conversation_id, Role::Asker, content)
    }

    /// Create an assistant turn.
    pub fn assistant(conversation_id: Uuid, content: impl Into<String>) -> Self {
        Self::new(conversation_id, Role::Assistant, content)
    }

    fn new(conversation_id: Uuid, role: Role, content: impl Into<String>) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            conversation_id,
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// Kind of answer produced by a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerKind {
    Answer,
}

/// Output of any answering stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerResult {
    pub kind: AnswerKind,
    pub answer: String,
    /// Assistant message minted for this answer
    pub message: Message,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<SourceBundle>,
}

impl AnswerResult {
    pub fn new(conversation_id: Uuid, answer: impl Into<String>) -> Self {
        let answer = answer.into();
        Self {
            kind: AnswerKind::Answer,
            message: Message::assistant(conversation_id, answer.clone()),
            answer,
            sources: None,
        }
    }

    pub fn with_sources(mut self, sources: SourceBundle) -> Self {
        if !sources.is_empty() {
            self.sources = Some(sources);
        }
        self
    }
}

/// Citations attached to an answer. Either list may be empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceBundle {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub document_sources: Vec<DocumentSource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub web_sources: Vec<WebSource>,
}

impl SourceBundle {
    pub fn is_empty(&self) -> bool {
        self.document_sources.is_empty() && self.web_sources.is_empty()
    }
}

/// One cited knowledge-store file, with the chunks drawn from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSource {
    pub file_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    pub chunks: Vec<DocumentChunk>,
}

/// A single grounding chunk cited from a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<String>,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_start: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_end: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

/// A web page cited by the web augmentation stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebSource {
    pub title: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}
