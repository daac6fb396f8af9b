//! Stats command handler.

use crate::commands::build_pipeline;
use clap::Args;
use docent_core::{AppConfig, AppResult};

/// Show cache statistics
#[derive(Args, Debug)]
pub struct StatsCommand {
    /// Sweep expired entries before reporting
    #[arg(long)]
    pub sweep: bool,
}

impl StatsCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let pipeline = build_pipeline(config)?;

        if self.sweep {
            let removed = pipeline.cache.sweep_expired().await + pipeline.contexts.sweep().await;
            tracing::info!(removed, "swept expired cache entries");
        }

        let answer_stats = pipeline.cache.stats().await;
        let context_stats = pipeline.contexts.stats().await;
        let registry = docent_retrieval::StoreRegistry::new(config.store_registry_path());

        let report = serde_json::json!({
            "caches": {
                "systemPrompts": answer_stats.system_prompts,
                "conversations": answer_stats.conversations,
                "enhancements": answer_stats.enhancements,
            },
            "upstreamContexts": {
                "records": context_stats.records,
                "cachedTokens": context_stats.cached_tokens,
            },
            "stores": registry.stores().len(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        Ok(())
    }
}
