//! Ask command handler.

use crate::commands::build_pipeline;
use clap::Args;
use docent_core::{AnswerResult, AppConfig, AppResult};
use uuid::Uuid;

/// Ask a question against the document stores
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: String,

    /// Conversation id to continue (default: a fresh conversation)
    #[arg(long)]
    pub conversation: Option<Uuid>,

    /// Augment the document answer with live web search
    #[arg(long)]
    pub web: bool,

    /// Output the full result as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");

        let pipeline = build_pipeline(config)?;
        let conversation_id = self.conversation.unwrap_or_else(Uuid::new_v4);
        // A single-user CLI session owns every conversation it starts
        pipeline.conversations.set_owner(conversation_id, "local-user");

        let result = pipeline
            .service
            .generate(&self.question, conversation_id, self.web)
            .await;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else {
            print_result(&result, conversation_id);
        }
        Ok(())
    }
}

fn print_result(result: &AnswerResult, conversation_id: Uuid) {
    println!("{}", result.answer);

    if let Some(sources) = &result.sources {
        if !sources.document_sources.is_empty() {
            println!("\nDocument sources:");
            for source in &sources.document_sources {
                let pages: Vec<String> = source
                    .chunks
                    .iter()
                    .filter_map(|c| c.page_start.map(|p| p.to_string()))
                    .collect();
                if pages.is_empty() {
                    println!("  - {}", source.file_name);
                } else {
                    println!("  - {} (pages {})", source.file_name, pages.join(", "));
                }
            }
        }
        if !sources.web_sources.is_empty() {
            println!("\nWeb sources:");
            for source in &sources.web_sources {
                println!("  - {} <{}>", source.title, source.url);
            }
        }
    }

    eprintln!("\n(conversation: {conversation_id})");
}
