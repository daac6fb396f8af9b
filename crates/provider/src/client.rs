//! Provider client abstraction and request/response types.
//!
//! The wire types mirror the Gemini generateContent shapes, but every field
//! on the response side is optional: real responses vary between a direct
//! text field and nested candidate/part structures, and the parser must
//! tolerate all of them.

use docent_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Role of a content block in a generation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentRole {
    User,
    Model,
}

/// One part of a content block. Only text parts are used by this pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
        }
    }
}

/// A role-tagged message in a generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub role: ContentRole,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ContentRole::User,
            parts: vec![Part::text(text)],
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: ContentRole::Model,
            parts: vec![Part::text(text)],
        }
    }
}

/// Grounding tool attached to a generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroundingTool {
    /// Search the named provider-side document stores
    DocumentStores(Vec<String>),
    /// Search the web
    WebSearch,
}

impl Serialize for GroundingTool {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            GroundingTool::DocumentStores(names) => serde_json::json!({
                "fileSearch": { "fileSearchStoreNames": names }
            })
            .serialize(serializer),
            GroundingTool::WebSearch => {
                serde_json::json!({ "googleSearch": {} }).serialize(serializer)
            }
        }
    }
}

/// Text generation request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    #[serde(skip)]
    pub model: String,

    pub contents: Vec<Content>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<GroundingTool>,

    /// Provider-side cached context handle
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_content: Option<String>,
}

impl GenerateRequest {
    pub fn new(model: impl Into<String>, contents: Vec<Content>) -> Self {
        Self {
            model: model.into(),
            contents,
            system_instruction: None,
            tools: Vec::new(),
            cached_content: None,
        }
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(Content::user(instruction));
        self
    }

    pub fn with_tool(mut self, tool: GroundingTool) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_cached_content(mut self, handle: impl Into<String>) -> Self {
        self.cached_content = Some(handle.into());
        self
    }
}

/// Text generation response. Every field is optional; see
/// [`GenerateResponse::extract_text`] for the tolerant read path.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    /// Direct text field some response shapes carry
    #[serde(default)]
    pub text: Option<String>,

    #[serde(default)]
    pub candidates: Vec<Candidate>,

    #[serde(default)]
    pub usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<CandidateContent>,

    #[serde(default)]
    pub finish_reason: Option<String>,

    #[serde(default)]
    pub grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingMetadata {
    #[serde(default)]
    pub grounding_chunks: Vec<GroundingChunk>,
}

/// One grounding reference: either a retrieved document chunk or a web page.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingChunk {
    #[serde(default)]
    pub retrieved_context: Option<RetrievedContext>,

    #[serde(default)]
    pub web: Option<WebChunk>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedContext {
    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub document_name: Option<String>,

    #[serde(default)]
    pub uri: Option<String>,

    #[serde(default)]
    pub text: Option<String>,

    #[serde(default)]
    pub rag_chunk: Option<RagChunk>,

    #[serde(default)]
    pub confidence: Option<f32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RagChunk {
    #[serde(default)]
    pub text: Option<String>,

    #[serde(default)]
    pub page_span: Option<PageSpan>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSpan {
    #[serde(default)]
    pub first_page: Option<u32>,

    #[serde(default)]
    pub last_page: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebChunk {
    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub uri: Option<String>,

    #[serde(default)]
    pub snippet: Option<String>,
}

/// Token usage counters.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub cached_content_token_count: Option<u32>,

    #[serde(default)]
    pub total_token_count: Option<u32>,
}

impl GenerateResponse {
    /// Extract plain answer text from whichever shape the response took.
    ///
    /// Tries the direct `text` field first, then walks every candidate and
    /// part. An empty or unparseable response is an error, never a panic.
    pub fn extract_text(&self) -> AppResult<String> {
        if let Some(text) = &self.text {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                return Ok(trimmed.to_string());
            }
        }

        for candidate in &self.candidates {
            let Some(content) = &candidate.content else {
                continue;
            };
            for part in &content.parts {
                if let Some(text) = &part.text {
                    let trimmed = text.trim();
                    if !trimmed.is_empty() {
                        return Ok(trimmed.to_string());
                    }
                }
            }
        }

        let finish_reason = self
            .candidates
            .first()
            .and_then(|c| c.finish_reason.as_deref())
            .unwrap_or("unknown");

        Err(AppError::provider(
            None,
            format!("response did not include plain text (finish reason: {finish_reason})"),
        ))
    }

    /// Concatenate text across all candidates and parts.
    ///
    /// Web-grounded answers sometimes split one narrative over several
    /// parts; joining preserves the full text.
    pub fn joined_text(&self) -> String {
        if let Some(text) = &self.text {
            if !text.trim().is_empty() {
                return text.trim().to_string();
            }
        }

        let mut pieces = Vec::new();
        for candidate in &self.candidates {
            let Some(content) = &candidate.content else {
                continue;
            };
            for part in &content.parts {
                if let Some(text) = &part.text {
                    if !text.is_empty() {
                        pieces.push(text.as_str());
                    }
                }
            }
        }
        pieces.join("")
    }

    /// All grounding chunks across candidates, in response order.
    pub fn grounding_chunks(&self) -> impl Iterator<Item = &GroundingChunk> {
        self.candidates
            .iter()
            .filter_map(|c| c.grounding_metadata.as_ref())
            .flat_map(|m| m.grounding_chunks.iter())
    }
}

/// A named provider-side document store.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreInfo {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub display_name: Option<String>,
}

/// An uploaded file handle.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub display_name: Option<String>,
}

/// A pollable long-running operation (file import).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationStatus {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub done: bool,

    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

/// A provider-side cached context handle with its expiry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedContextInfo {
    pub name: String,

    /// RFC 3339 expiry reported by the provider
    #[serde(default)]
    pub expire_time: Option<String>,

    #[serde(default)]
    pub token_count: Option<u32>,
}

/// Trait for generative-AI providers.
///
/// This is the only seam through which the pipeline talks to the upstream
/// service: generation with optional grounding, named store management, file
/// upload and import, and provider-side context caching.
#[async_trait::async_trait]
pub trait GenAiClient: Send + Sync {
    /// Provider identifier (e.g. "gemini", "mock").
    fn provider_name(&self) -> &str;

    /// Generate text, optionally grounded by the request's tools.
    async fn generate(&self, request: &GenerateRequest) -> AppResult<GenerateResponse>;

    /// Create a named document store and return its handle.
    async fn create_store(&self, display_name: &str) -> AppResult<String>;

    /// List the document stores visible to this key.
    async fn list_stores(&self) -> AppResult<Vec<StoreInfo>>;

    /// Upload a file and return its provider handle.
    async fn upload_file(
        &self,
        path: &Path,
        display_name: &str,
        mime_type: &str,
    ) -> AppResult<String>;

    /// Start importing an uploaded file into a store.
    async fn import_file(&self, store_name: &str, file_name: &str) -> AppResult<OperationStatus>;

    /// Poll a long-running operation.
    async fn get_operation(&self, operation_name: &str) -> AppResult<OperationStatus>;

    /// Create a provider-side cached context for a reusable prompt prefix.
    async fn create_cached_context(
        &self,
        model: &str,
        system_prompt: &str,
        ttl_secs: u64,
    ) -> AppResult<CachedContextInfo>;

    /// Delete a provider-side cached context.
    async fn delete_cached_context(&self, name: &str) -> AppResult<()>;
}
