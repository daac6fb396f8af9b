//! Stores command handler: provisioning and inspection.

use crate::commands::build_pipeline;
use clap::{Args, Subcommand};
use docent_core::{AppConfig, AppResult};

/// Document store provisioning and inspection
#[derive(Args, Debug)]
pub struct StoresCommand {
    #[command(subcommand)]
    command: StoresSubcommand,
}

#[derive(Subcommand, Debug)]
enum StoresSubcommand {
    /// Create the seeded stores (idempotent) and optionally import their files
    Prepare {
        /// Also import the seed files into their stores
        #[arg(long)]
        import: bool,

        /// Re-import files even if already recorded as imported
        #[arg(long)]
        force: bool,
    },

    /// List the stores known to the registry
    List,
}

impl StoresCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let pipeline = build_pipeline(config)?;

        match &self.command {
            StoresSubcommand::Prepare { import, force } => {
                let handles = pipeline.stores.prepare().await?;
                println!("{} store(s) ready", handles.len());

                if *import {
                    let imported = pipeline.stores.import_seed_files(*force).await?;
                    println!("{imported} file(s) imported");
                }
            }
            StoresSubcommand::List => {
                let registry = docent_retrieval::StoreRegistry::new(config.store_registry_path());
                let stores = registry.stores();
                if stores.is_empty() {
                    println!("No stores registered yet; run `docent stores prepare`.");
                }
                for (display_name, handle) in stores {
                    println!("{display_name}\t{handle}");
                }
            }
        }
        Ok(())
    }
}
