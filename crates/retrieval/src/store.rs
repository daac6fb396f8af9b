//! Provider-side document store lifecycle.
//!
//! Stores move UNINITIALIZED → PROVISIONING → READY behind a single async
//! mutex: the first `prepare()` call provisions, concurrent callers await
//! the same pass, and a failure leaves the manager uninitialized so the
//! next call retries. Exactly one store-creation call is made per distinct
//! display name across the process lifetime.

use crate::registry::StoreRegistry;
use docent_core::{AppError, AppResult};
use docent_provider::GenAiClient;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Interval between import-operation polls.
const IMPORT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Give up polling an import after this many attempts.
const IMPORT_POLL_LIMIT: usize = 60;

/// One knowledge store described in the seed file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSeed {
    pub display_name: String,

    #[serde(default)]
    pub files: Vec<FileSeed>,

    /// Provider handle of a pre-existing store, skipping creation
    #[serde(default)]
    pub existing_name: Option<String>,
}

/// One document to import into a seeded store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSeed {
    pub path: PathBuf,

    #[serde(default)]
    pub display_name: Option<String>,

    #[serde(default)]
    pub mime_type: Option<String>,
}

impl FileSeed {
    fn display_name(&self) -> String {
        match &self.display_name {
            Some(name) => sanitize_display_name(name),
            None => sanitize_display_name(
                &self
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "document".to_string()),
            ),
        }
    }

    fn mime_type(&self) -> String {
        match &self.mime_type {
            Some(mime) => mime.clone(),
            None => infer_mime_type(&self.path).to_string(),
        }
    }
}

/// Load store seeds from a YAML file.
pub fn load_seeds(path: &Path) -> AppResult<Vec<StoreSeed>> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        AppError::Config(format!("failed to read seed file {}: {e}", path.display()))
    })?;
    let seeds: Vec<StoreSeed> = serde_yaml::from_str(&contents).map_err(|e| {
        AppError::Config(format!("failed to parse seed file {}: {e}", path.display()))
    })?;
    Ok(seeds)
}

/// Idempotent provisioner for the seeded document stores.
pub struct StoreManager {
    client: Arc<dyn GenAiClient>,
    registry: StoreRegistry,
    seeds: Vec<StoreSeed>,
    /// `None` until a provisioning pass succeeds
    ready: Mutex<Option<Vec<String>>>,
    poll_interval: Duration,
}

impl StoreManager {
    pub fn new(
        client: Arc<dyn GenAiClient>,
        registry: StoreRegistry,
        seeds: Vec<StoreSeed>,
    ) -> Self {
        Self {
            client,
            registry,
            seeds,
            ready: Mutex::new(None),
            poll_interval: IMPORT_POLL_INTERVAL,
        }
    }

    #[cfg(test)]
    fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Ensure every seeded store exists, returning their provider handles.
    ///
    /// Concurrent callers share one provisioning pass. On failure nothing
    /// is memoized, so the next caller retries from scratch; stores created
    /// before the failure are found again through the registry.
    pub async fn prepare(&self) -> AppResult<Vec<String>> {
        let mut ready = self.ready.lock().await;
        if let Some(handles) = ready.as_ref() {
            return Ok(handles.clone());
        }

        let mut handles = Vec::with_capacity(self.seeds.len());
        for seed in &self.seeds {
            let handle = self.resolve_store(seed).await?;
            handles.push(handle);
        }

        *ready = Some(handles.clone());
        tracing::info!(stores = handles.len(), "document stores ready");
        Ok(handles)
    }

    async fn resolve_store(&self, seed: &StoreSeed) -> AppResult<String> {
        if let Some(existing) = &seed.existing_name {
            return Ok(existing.clone());
        }
        if let Some(handle) = self.registry.store_handle(&seed.display_name) {
            tracing::debug!(store = %seed.display_name, %handle, "store already registered");
            return Ok(handle);
        }

        let handle = self.client.create_store(&seed.display_name).await?;
        self.registry.record_store(&seed.display_name, &handle)?;
        tracing::info!(store = %seed.display_name, %handle, "created document store");
        Ok(handle)
    }

    /// Import every seeded file into its store, returning the number of
    /// files imported. Already-imported files are skipped unless `force`.
    pub async fn import_seed_files(&self, force: bool) -> AppResult<usize> {
        let handles = self.prepare().await?;

        let mut imported = 0;
        for (seed, store_handle) in self.seeds.iter().zip(&handles) {
            for file in &seed.files {
                let display_name = file.display_name();
                if !force && self.registry.is_imported(&seed.display_name, &display_name) {
                    tracing::debug!(store = %seed.display_name, file = %display_name, "already imported, skipping");
                    continue;
                }

                self.upload_and_import(store_handle, &file.path, &display_name, &file.mime_type())
                    .await?;
                self.registry.record_import(&seed.display_name, &display_name)?;
                imported += 1;
            }
        }
        Ok(imported)
    }

    /// Upload ad-hoc documents into a store.
    pub async fn upload_documents(
        &self,
        store_handle: &str,
        paths: &[PathBuf],
    ) -> AppResult<Vec<String>> {
        let mut names = Vec::with_capacity(paths.len());
        for path in paths {
            let display_name = sanitize_display_name(
                &path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "document".to_string()),
            );
            let mime = infer_mime_type(path).to_string();
            self.upload_and_import(store_handle, path, &display_name, &mime)
                .await?;
            names.push(display_name);
        }
        Ok(names)
    }

    async fn upload_and_import(
        &self,
        store_handle: &str,
        path: &Path,
        display_name: &str,
        mime_type: &str,
    ) -> AppResult<()> {
        tracing::info!(file = %display_name, mime = %mime_type, "uploading document");
        let file_handle = self.client.upload_file(path, display_name, mime_type).await?;

        let mut operation = self.client.import_file(store_handle, &file_handle).await?;
        let mut polls = 0;
        while !operation.done {
            let Some(name) = operation.name.as_deref() else {
                return Err(AppError::Retrieval(format!(
                    "import of {display_name} returned an unnamed pending operation"
                )));
            };
            if polls >= IMPORT_POLL_LIMIT {
                return Err(AppError::Retrieval(format!(
                    "import of {display_name} did not finish after {polls} polls"
                )));
            }
            polls += 1;
            tokio::time::sleep(self.poll_interval).await;
            operation = self.client.get_operation(name).await?;
        }

        if let Some(error) = &operation.error {
            return Err(AppError::Retrieval(format!(
                "import of {display_name} failed: {error}"
            )));
        }
        tracing::info!(file = %display_name, "import complete");
        Ok(())
    }
}

/// Restrict a display name to printable ASCII; anything else becomes `_`.
/// The upstream API rejects file display names outside that range.
fn sanitize_display_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '_' })
        .collect()
}

fn infer_mime_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain",
        Some("md") => "text/markdown",
        Some("html") | Some("htm") => "text/html",
        Some("csv") => "text/csv",
        Some("json") => "application/json",
        Some("docx") => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docent_provider::MockClient;
    use std::sync::atomic::Ordering;

    fn seed(display_name: &str) -> StoreSeed {
        StoreSeed {
            display_name: display_name.to_string(),
            files: vec![],
            existing_name: None,
        }
    }

    fn manager_with(
        client: Arc<MockClient>,
        seeds: Vec<StoreSeed>,
    ) -> (StoreManager, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let registry = StoreRegistry::new(dir.path().join("registry.json"));
        let manager = StoreManager::new(client, registry, seeds)
            .with_poll_interval(Duration::from_millis(1));
        (manager, dir)
    }

    #[test]
    fn test_sanitize_display_name() {
        assert_eq!(sanitize_display_name("policy.txt"), "policy.txt");
        assert_eq!(sanitize_display_name("연차 규정.pdf"), "__ __.pdf");
        assert_eq!(sanitize_display_name("a\tb"), "a_b");
    }

    #[test]
    fn test_infer_mime_type() {
        assert_eq!(infer_mime_type(Path::new("a.PDF")), "application/pdf");
        assert_eq!(infer_mime_type(Path::new("a.md")), "text/markdown");
        assert_eq!(infer_mime_type(Path::new("a.bin")), "application/octet-stream");
        assert_eq!(infer_mime_type(Path::new("noext")), "application/octet-stream");
    }

    #[test]
    fn test_seed_yaml_shape() {
        let yaml = r#"
- displayName: hr-docs
  files:
    - path: docs/policy.txt
    - path: docs/handbook.pdf
      displayName: Employee Handbook
- displayName: legacy
  existingName: fileSearchStores/legacy
"#;
        let seeds: Vec<StoreSeed> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(seeds.len(), 2);
        assert_eq!(seeds[0].files.len(), 2);
        assert_eq!(
            seeds[1].existing_name.as_deref(),
            Some("fileSearchStores/legacy")
        );
    }

    #[tokio::test]
    async fn test_prepare_is_idempotent() {
        let client = Arc::new(MockClient::new());
        let (manager, _dir) = manager_with(Arc::clone(&client), vec![seed("hr-docs")]);

        let first = manager.prepare().await.unwrap();
        let second = manager.prepare().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(client.create_store_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_prepare_creates_each_store_once() {
        let client = Arc::new(MockClient::new());
        let (manager, _dir) = manager_with(
            Arc::clone(&client),
            vec![seed("hr-docs"), seed("eng-docs")],
        );
        let manager = Arc::new(manager);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let manager = Arc::clone(&manager);
            handles.push(tokio::spawn(async move { manager.prepare().await }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().len(), 2);
        }
        assert_eq!(client.create_store_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_provisioning_retries_without_duplicating_stores() {
        let client = Arc::new(MockClient::new().with_store_failures(1));
        let (manager, _dir) = manager_with(
            Arc::clone(&client),
            vec![seed("hr-docs"), seed("eng-docs")],
        );

        assert!(manager.prepare().await.is_err());

        // Nothing was memoized, so the next call retries the whole pass
        let handles = manager.prepare().await.unwrap();
        assert_eq!(handles.len(), 2);
        // One failed attempt plus two successful creations
        assert_eq!(client.create_store_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_existing_store_skips_creation() {
        let client = Arc::new(MockClient::new());
        let mut existing = seed("legacy");
        existing.existing_name = Some("fileSearchStores/legacy".to_string());
        let (manager, _dir) = manager_with(Arc::clone(&client), vec![existing]);

        let handles = manager.prepare().await.unwrap();
        assert_eq!(handles, ["fileSearchStores/legacy"]);
        assert_eq!(client.create_store_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_import_polls_until_done_and_skips_on_reimport() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("policy.txt");
        std::fs::write(&doc, "Annual leave is twenty days.").unwrap();

        let client = Arc::new(MockClient::new().with_polls_until_done(2));
        let store = StoreSeed {
            display_name: "hr-docs".to_string(),
            files: vec![FileSeed {
                path: doc,
                display_name: None,
                mime_type: None,
            }],
            existing_name: None,
        };
        let (manager, _registry_dir) = manager_with(Arc::clone(&client), vec![store]);

        assert_eq!(manager.import_seed_files(false).await.unwrap(), 1);
        assert_eq!(client.upload_calls.load(Ordering::SeqCst), 1);

        // Second pass without force skips the already-imported file
        assert_eq!(manager.import_seed_files(false).await.unwrap(), 0);
        assert_eq!(client.upload_calls.load(Ordering::SeqCst), 1);

        // Force re-imports
        assert_eq!(manager.import_seed_files(true).await.unwrap(), 1);
        assert_eq!(client.upload_calls.load(Ordering::SeqCst), 2);
    }
}
