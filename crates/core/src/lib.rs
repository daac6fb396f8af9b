//! Docent Core Library
//!
//! This crate provides the foundational utilities for the Docent answering
//! pipeline:
//! - Error handling (`AppError`, `AppResult`)
//! - Logging infrastructure
//! - Configuration management
//! - Clock abstraction for deterministic cache tests
//! - Shared domain types (messages, answers, sources)

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use types::{
    AnswerKind, AnswerResult, DocumentChunk, DocumentSource, Message, Role, SourceBundle,
    WebSource,
};
