//! Upload command handler.

use crate::commands::build_pipeline;
use clap::Args;
use docent_core::{AppConfig, AppError, AppResult};
use std::path::PathBuf;

/// Upload a document into a store
#[derive(Args, Debug)]
pub struct UploadCommand {
    /// File to upload
    pub file: PathBuf,

    /// Target store display name (default: the first seeded store)
    #[arg(short, long)]
    pub store: Option<String>,
}

impl UploadCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        if !self.file.exists() {
            return Err(AppError::Config(format!(
                "File does not exist: {}",
                self.file.display()
            )));
        }

        let pipeline = build_pipeline(config)?;
        let handles = pipeline.stores.prepare().await?;

        let store_handle = match &self.store {
            Some(display_name) => {
                let registry = docent_retrieval::StoreRegistry::new(config.store_registry_path());
                registry.store_handle(display_name).ok_or_else(|| {
                    AppError::Retrieval(format!("unknown store: {display_name}"))
                })?
            }
            None => handles
                .first()
                .cloned()
                .ok_or_else(|| AppError::Retrieval("no stores are configured".to_string()))?,
        };

        let names = pipeline
            .stores
            .upload_documents(&store_handle, std::slice::from_ref(&self.file))
            .await?;
        for name in names {
            println!("imported {name}");
        }
        Ok(())
    }
}
