//! The hybrid answering pipeline.
//!
//! [`HybridOrchestrator`] chains the three answering stages (document
//! retrieval, optional web augmentation, general-knowledge fallback) with
//! per-stage time budgets and quality gating. [`AnswerService`] sits above
//! it and owns the conversation plumbing: history caching, personalization,
//! upstream context handles, and the guarantee that a question always gets
//! an answer rather than an error.

pub mod general;
pub mod hybrid;
pub mod memory;
pub mod rate_limit;
pub mod service;
pub mod web;

pub use general::{GeneralAssistant, GeneralOptions};
pub use hybrid::{HybridOptions, HybridOrchestrator, StageBudgets};
pub use memory::{InMemoryConversationStore, InMemoryUserProfile};
pub use rate_limit::RateLimiter;
pub use service::{AnswerService, ConversationStore, UserProfile};
pub use web::{WebSearchAssistant, WebSearchOutcome};
