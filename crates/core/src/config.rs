//! Configuration management for the Docent pipeline.
//!
//! This module handles loading and merging configuration from multiple
//! sources:
//! - Environment variables
//! - Command-line flags
//! - Config files (docent.yaml)
//!
//! Every knob has a default, so the pipeline runs with nothing but an API
//! key in the environment.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (registry and seed files resolve against it)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Provider API key (DOCENT_API_KEY, falling back to GOOGLE_API_KEY)
    pub api_key: Option<String>,

    /// Provider base URL
    pub base_url: String,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// Pipeline tuning
    pub pipeline: PipelineConfig,
}

/// Tuning knobs for the answering pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Model used for document-grounded answering
    pub retrieval_model: String,

    /// Model used for web-grounded answering
    pub web_model: String,

    /// Model used for ungrounded fallback answers and classification
    pub general_model: String,

    /// Stage budget for document retrieval, in seconds
    pub retrieval_timeout_secs: u64,

    /// Stage budget for web augmentation, in seconds
    pub web_timeout_secs: u64,

    /// Stage budget for the general-knowledge fallback, in seconds
    pub fallback_timeout_secs: u64,

    /// System prompt cache TTL, in seconds
    pub system_prompt_ttl_secs: u64,

    /// Conversation history cache TTL, in seconds
    pub conversation_ttl_secs: u64,

    /// Web enhancement replay cache TTL, in seconds
    pub enhancement_ttl_secs: u64,

    /// Max web requests per rolling one-minute window
    pub web_requests_per_minute: u32,

    /// Minimum spacing between web requests, in milliseconds
    pub web_min_interval_ms: u64,

    /// Store registry file (relative paths resolve against the workspace)
    pub store_registry: PathBuf,

    /// Store seed file describing knowledge stores and their documents
    pub store_seeds: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retrieval_model: "gemini-2.5-pro".to_string(),
            web_model: "gemini-2.0-flash".to_string(),
            general_model: "gemini-2.0-flash".to_string(),
            retrieval_timeout_secs: 60,
            web_timeout_secs: 60,
            fallback_timeout_secs: 30,
            system_prompt_ttl_secs: 60 * 60,
            conversation_ttl_secs: 30 * 60,
            enhancement_ttl_secs: 30 * 60,
            web_requests_per_minute: 10,
            web_min_interval_ms: 1_000,
            store_registry: PathBuf::from("store-registry.json"),
            store_seeds: None,
        }
    }
}

impl PipelineConfig {
    pub fn retrieval_timeout(&self) -> Duration {
        Duration::from_secs(self.retrieval_timeout_secs)
    }

    pub fn web_timeout(&self) -> Duration {
        Duration::from_secs(self.web_timeout_secs)
    }

    pub fn fallback_timeout(&self) -> Duration {
        Duration::from_secs(self.fallback_timeout_secs)
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigFile {
    pipeline: Option<PipelineConfig>,
    provider: Option<ProviderSection>,
    logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProviderSection {
    base_url: Option<String>,
    api_key_env: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
}

/// Default provider endpoint.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            log_level: None,
            verbose: false,
            no_color: false,
            pipeline: PipelineConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and defaults.
    ///
    /// Environment variables:
    /// - `DOCENT_WORKSPACE`: Override workspace path
    /// - `DOCENT_CONFIG`: Path to config file
    /// - `DOCENT_API_KEY` / `GOOGLE_API_KEY`: Provider API key
    /// - `DOCENT_BASE_URL`: Provider endpoint
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(workspace) = std::env::var("DOCENT_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }

        if let Ok(config_file) = std::env::var("DOCENT_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = if let Some(ref cf) = config.config_file {
            cf.clone()
        } else {
            config.workspace.join("docent.yaml")
        };

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        // Environment variables override the YAML file
        config.api_key = std::env::var("DOCENT_API_KEY")
            .or_else(|_| std::env::var("GOOGLE_API_KEY"))
            .ok()
            .or(config.api_key);

        if let Ok(base_url) = std::env::var("DOCENT_BASE_URL") {
            config.base_url = base_url;
        }

        config.log_level = std::env::var("RUST_LOG").ok().or(config.log_level);

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge YAML configuration file into this config.
    fn merge_yaml(&mut self, path: &PathBuf) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
        }

        if let Some(provider) = config_file.provider {
            if let Some(base_url) = provider.base_url {
                result.base_url = base_url;
            }
            if let Some(env_var) = provider.api_key_env {
                result.api_key = std::env::var(env_var).ok().or(result.api_key);
            }
        }

        if let Some(pipeline) = config_file.pipeline {
            result.pipeline = pipeline;
        }

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// CLI flags take precedence over environment variables and the file.
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Resolve the store registry path against the workspace.
    pub fn store_registry_path(&self) -> PathBuf {
        let path = &self.pipeline.store_registry;
        if path.is_absolute() {
            path.clone()
        } else {
            self.workspace.join(path)
        }
    }

    /// Require an API key, failing with a configuration error.
    pub fn require_api_key(&self) -> AppResult<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            AppError::Config(
                "Provider API key not configured (set DOCENT_API_KEY or GOOGLE_API_KEY)"
                    .to_string(),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.pipeline.retrieval_model, "gemini-2.5-pro");
        assert_eq!(config.pipeline.web_requests_per_minute, 10);
        assert!(!config.verbose);
    }

    #[test]
    fn test_with_overrides() {
        let config = AppConfig::default().with_overrides(
            Some(PathBuf::from("/tmp")),
            None,
            None,
            true,
            false,
        );
        assert_eq!(config.workspace, PathBuf::from("/tmp"));
        assert!(config.verbose);
        assert_eq!(config.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_registry_path_resolution() {
        let mut config = AppConfig::default();
        config.workspace = PathBuf::from("/data");
        assert_eq!(
            config.store_registry_path(),
            PathBuf::from("/data/store-registry.json")
        );

        config.pipeline.store_registry = PathBuf::from("/abs/registry.json");
        assert_eq!(
            config.store_registry_path(),
            PathBuf::from("/abs/registry.json")
        );
    }

    #[test]
    fn test_missing_api_key_is_config_error() {
        let config = AppConfig::default();
        assert!(matches!(
            config.require_api_key(),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_pipeline_yaml_merge() {
        let yaml = r#"
pipeline:
  retrievalModel: gemini-2.5-flash
  webRequestsPerMinute: 5
logging:
  level: warn
"#;
        let parsed: ConfigFile = serde_yaml::from_str(yaml).unwrap();
        let pipeline = parsed.pipeline.unwrap();
        assert_eq!(pipeline.retrieval_model, "gemini-2.5-flash");
        assert_eq!(pipeline.web_requests_per_minute, 5);
        // Unspecified knobs keep their defaults
        assert_eq!(pipeline.web_min_interval_ms, 1_000);
    }
}
