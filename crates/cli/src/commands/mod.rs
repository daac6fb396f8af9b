//! Command handlers for the Docent CLI.
//!
//! This module organizes all CLI commands into separate submodules and
//! hosts the shared pipeline wiring they build on.

pub mod ask;
pub mod stats;
pub mod stores;
pub mod upload;

// Re-export command types for convenience
pub use ask::AskCommand;
pub use stats::StatsCommand;
pub use stores::StoresCommand;
pub use upload::UploadCommand;

use chrono::Duration as ChronoDuration;
use docent_cache::{AnswerCache, UpstreamContextCache};
use docent_core::{AppConfig, AppResult, SystemClock};
use docent_pipeline::{
    AnswerService, ConversationStore, GeneralAssistant, HybridOrchestrator,
    InMemoryConversationStore, InMemoryUserProfile, RateLimiter, StageBudgets, UserProfile,
    WebSearchAssistant,
};
use docent_provider::{GeminiClient, GenAiClient};
use docent_retrieval::{load_seeds, DocumentAssistant, StoreManager, StoreRegistry, StoreSeed};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// The assembled answering stack, shared by the command handlers.
pub(crate) struct Pipeline {
    pub service: AnswerService,
    pub stores: Arc<StoreManager>,
    pub cache: Arc<AnswerCache>,
    pub contexts: Arc<UpstreamContextCache>,
    pub conversations: Arc<InMemoryConversationStore>,
}

/// Wire the full pipeline from configuration.
pub(crate) fn build_pipeline(config: &AppConfig) -> AppResult<Pipeline> {
    let api_key = config.require_api_key()?;
    let client: Arc<dyn GenAiClient> =
        Arc::new(GeminiClient::with_base_url(&config.base_url, api_key));
    let clock = Arc::new(SystemClock);

    let registry = StoreRegistry::new(config.store_registry_path());
    let seeds = load_configured_seeds(config)?;
    let stores = Arc::new(StoreManager::new(Arc::clone(&client), registry, seeds));

    let documents = Arc::new(DocumentAssistant::new(
        Arc::clone(&client),
        Arc::clone(&stores),
        &config.pipeline.retrieval_model,
    ));
    let web = Arc::new(WebSearchAssistant::new(
        Arc::clone(&client),
        &config.pipeline.web_model,
        Arc::new(RateLimiter::new(
            config.pipeline.web_requests_per_minute,
            Duration::from_millis(config.pipeline.web_min_interval_ms),
        )),
    ));
    let general = Arc::new(GeneralAssistant::new(
        Arc::clone(&client),
        &config.pipeline.general_model,
    ));

    let cache = Arc::new(AnswerCache::new(
        ChronoDuration::seconds(config.pipeline.system_prompt_ttl_secs as i64),
        ChronoDuration::seconds(config.pipeline.conversation_ttl_secs as i64),
        ChronoDuration::seconds(config.pipeline.enhancement_ttl_secs as i64),
        clock.clone(),
    ));
    let contexts = Arc::new(UpstreamContextCache::new(
        Arc::clone(&client),
        ChronoDuration::seconds(config.pipeline.system_prompt_ttl_secs as i64),
        clock,
    ));

    let budgets = StageBudgets {
        retrieval: config.pipeline.retrieval_timeout(),
        web: config.pipeline.web_timeout(),
        fallback: config.pipeline.fallback_timeout(),
    };
    let orchestrator = Arc::new(HybridOrchestrator::new(
        documents,
        web,
        general,
        Arc::clone(&cache),
        budgets,
    ));

    let conversations = Arc::new(InMemoryConversationStore::new());
    let profiles = Arc::new(InMemoryUserProfile::new());

    let service = AnswerService::new(
        orchestrator,
        Arc::clone(&cache),
        Arc::clone(&contexts),
        Arc::clone(&conversations) as Arc<dyn ConversationStore>,
        profiles as Arc<dyn UserProfile>,
        &config.pipeline.general_model,
    );

    Ok(Pipeline {
        service,
        stores,
        cache,
        contexts,
        conversations,
    })
}

/// Seeds from the configured seed file, or a single default store.
fn load_configured_seeds(config: &AppConfig) -> AppResult<Vec<StoreSeed>> {
    match &config.pipeline.store_seeds {
        Some(path) => {
            let resolved = resolve_against_workspace(config, path);
            load_seeds(&resolved)
        }
        None => Ok(vec![StoreSeed {
            display_name: "docent-docs".to_string(),
            files: Vec::new(),
            existing_name: None,
        }]),
    }
}

fn resolve_against_workspace(config: &AppConfig, path: &PathBuf) -> PathBuf {
    if path.is_absolute() {
        path.clone()
    } else {
        config.workspace.join(path)
    }
}
