//! Generative-AI provider integration for the Docent pipeline.
//!
//! This crate provides a narrow, provider-agnostic contract for everything
//! the answering pipeline needs from an upstream generative-AI service:
//! text generation with optional grounding tools, named document stores,
//! file upload + asynchronous import, and provider-side context caching.
//!
//! # Implementations
//! - **Gemini**: HTTP client against the Generative Language API
//! - **Mock**: scripted in-process client for tests and offline development

pub mod client;
pub mod providers;
pub mod retry;

// Re-export main types
pub use client::{
    CachedContextInfo, Candidate, Content, ContentRole, FileInfo, GenAiClient, GenerateRequest,
    GenerateResponse, GroundingChunk, GroundingMetadata, GroundingTool, OperationStatus, PageSpan,
    Part, RagChunk, RetrievedContext, StoreInfo, UsageMetadata, WebChunk,
};
pub use providers::{GeminiClient, MockClient};
pub use retry::{retry, RetryPolicy};
