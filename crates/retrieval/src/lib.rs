//! Document store provisioning and document-grounded answering.
//!
//! [`StoreManager`] provisions provider-side document stores exactly once
//! per display name and imports seed documents into them. [`DocumentAssistant`]
//! answers questions grounded in those stores, and [`extract_citations`]
//! normalizes the provider's grounding metadata into per-file citations.

pub mod answer;
pub mod citations;
pub mod registry;
pub mod store;

pub use answer::{AnswerOptions, DocumentAssistant};
pub use citations::extract_citations;
pub use registry::StoreRegistry;
pub use store::{load_seeds, FileSeed, StoreManager, StoreSeed};
