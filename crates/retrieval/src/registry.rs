//! Durable map from store display names to provider store handles.
//!
//! The registry is a small JSON file in the workspace. A missing file means
//! an empty registry; an unreadable or corrupt file degrades to empty with a
//! warning, because registry I/O must never fail an answer request. Callers
//! serialize writes through the store manager's provisioning lock.

use docent_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct RegistryFile {
    /// Display name → provider store handle
    stores: HashMap<String, String>,
    /// Display name → file display names already imported into that store
    imported: HashMap<String, Vec<String>>,
}

/// JSON-file-backed store registry.
pub struct StoreRegistry {
    path: PathBuf,
}

impl StoreRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> RegistryFile {
        if !self.path.exists() {
            return RegistryFile::default();
        }
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(error) => {
                tracing::warn!(path = %self.path.display(), %error, "failed to read store registry, treating as empty");
                return RegistryFile::default();
            }
        };
        match serde_json::from_str(&contents) {
            Ok(file) => file,
            Err(error) => {
                tracing::warn!(path = %self.path.display(), %error, "store registry is corrupt, treating as empty");
                RegistryFile::default()
            }
        }
    }

    fn write(&self, file: &RegistryFile) -> AppResult<()> {
        let json = serde_json::to_string_pretty(file)?;
        std::fs::write(&self.path, json).map_err(|e| {
            AppError::Retrieval(format!(
                "failed to write store registry {}: {e}",
                self.path.display()
            ))
        })
    }

    /// Look up the provider handle for a display name.
    pub fn store_handle(&self, display_name: &str) -> Option<String> {
        self.read().stores.get(display_name).cloned()
    }

    /// Record a newly created store.
    pub fn record_store(&self, display_name: &str, handle: &str) -> AppResult<()> {
        let mut file = self.read();
        file.stores
            .insert(display_name.to_string(), handle.to_string());
        self.write(&file)
    }

    /// Whether a file was already imported into a store.
    pub fn is_imported(&self, display_name: &str, file_display_name: &str) -> bool {
        self.read()
            .imported
            .get(display_name)
            .is_some_and(|files| files.iter().any(|f| f == file_display_name))
    }

    /// Record a completed import.
    pub fn record_import(&self, display_name: &str, file_display_name: &str) -> AppResult<()> {
        let mut file = self.read();
        let imported = file.imported.entry(display_name.to_string()).or_default();
        if !imported.iter().any(|f| f == file_display_name) {
            imported.push(file_display_name.to_string());
        }
        self.write(&file)
    }

    /// All known stores, display name → handle.
    pub fn stores(&self) -> HashMap<String, String> {
        self.read().stores
    }
}
