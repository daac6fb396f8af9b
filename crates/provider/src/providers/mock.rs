//! Scripted mock provider for tests and offline development.
//!
//! Responses are queued per method; when a queue is empty the client falls
//! back to a configurable default. Call counters are atomic so concurrency
//! tests can assert exactly how many upstream calls were made.

use crate::client::{
    CachedContextInfo, GenAiClient, GenerateRequest, GenerateResponse, OperationStatus, StoreInfo,
};
use docent_core::{AppError, AppResult};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Scripted provider for tests.
pub struct MockClient {
    default_text: String,
    generate_queue: Mutex<VecDeque<AppResult<GenerateResponse>>>,
    generate_delay: Option<Duration>,
    store_failures: AtomicUsize,
    cached_context_failures: AtomicUsize,
    polls_until_done: usize,
    cached_context_tokens: Option<u32>,
    cached_context_expiry: Option<String>,

    pub generate_calls: AtomicUsize,
    pub create_store_calls: AtomicUsize,
    pub upload_calls: AtomicUsize,
    pub cached_context_calls: AtomicUsize,
    pub deleted_contexts: Mutex<Vec<String>>,
    pub last_request: Mutex<Option<GenerateRequest>>,
    poll_counts: Mutex<usize>,
}

impl MockClient {
    pub fn new() -> Self {
        Self {
            default_text: "mock answer".to_string(),
            generate_queue: Mutex::new(VecDeque::new()),
            generate_delay: None,
            store_failures: AtomicUsize::new(0),
            cached_context_failures: AtomicUsize::new(0),
            polls_until_done: 0,
            cached_context_tokens: Some(2048),
            cached_context_expiry: None,
            generate_calls: AtomicUsize::new(0),
            create_store_calls: AtomicUsize::new(0),
            upload_calls: AtomicUsize::new(0),
            cached_context_calls: AtomicUsize::new(0),
            deleted_contexts: Mutex::new(Vec::new()),
            last_request: Mutex::new(None),
            poll_counts: Mutex::new(0),
        }
    }

    /// Set the text returned when the response queue is empty.
    pub fn with_default_text(mut self, text: impl Into<String>) -> Self {
        self.default_text = text.into();
        self
    }

    /// Delay every generate call (for timeout and single-flight tests).
    pub fn with_generate_delay(mut self, delay: Duration) -> Self {
        self.generate_delay = Some(delay);
        self
    }

    /// Make the next `count` store creations fail with a 503.
    pub fn with_store_failures(self, count: usize) -> Self {
        self.store_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Make the next `count` cached-context creations fail with a 500.
    pub fn with_cached_context_failures(self, count: usize) -> Self {
        self.cached_context_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Require `polls` get_operation calls before imports report done.
    pub fn with_polls_until_done(mut self, polls: usize) -> Self {
        self.polls_until_done = polls;
        self
    }

    /// Token count reported for created cached contexts.
    pub fn with_cached_context_tokens(mut self, tokens: Option<u32>) -> Self {
        self.cached_context_tokens = tokens;
        self
    }

    /// Fixed RFC 3339 expiry reported for created cached contexts, as when
    /// the provider clamps the requested TTL.
    pub fn with_cached_context_expiry(mut self, expire_time: impl Into<String>) -> Self {
        self.cached_context_expiry = Some(expire_time.into());
        self
    }

    /// Queue a response for the next generate call.
    pub fn push_response(&self, response: GenerateResponse) {
        self.generate_queue.lock().unwrap().push_back(Ok(response));
    }

    /// Queue a failure for the next generate call.
    pub fn push_failure(&self, error: AppError) {
        self.generate_queue.lock().unwrap().push_back(Err(error));
    }

    /// Queue a plain-text response.
    pub fn push_text(&self, text: &str) {
        self.push_response(Self::text_response(text));
    }

    /// Build a response carrying only candidate text.
    pub fn text_response(text: &str) -> GenerateResponse {
        serde_json::from_value(serde_json::json!({
            "candidates": [ { "content": { "parts": [ { "text": text } ] } } ]
        }))
        .expect("static response shape")
    }

    /// Build a document-grounded response: one retrieved chunk per
    /// `(file_name, chunk_text)` pair.
    pub fn grounded_response(text: &str, chunks: &[(&str, &str)]) -> GenerateResponse {
        let grounding: Vec<_> = chunks
            .iter()
            .map(|(file, snippet)| {
                serde_json::json!({
                    "retrievedContext": {
                        "title": file,
                        "documentName": format!("fileSearchStores/s/documents/{file}"),
                        "ragChunk": { "text": snippet }
                    }
                })
            })
            .collect();

        serde_json::from_value(serde_json::json!({
            "candidates": [ {
                "content": { "parts": [ { "text": text } ] },
                "groundingMetadata": { "groundingChunks": grounding }
            } ]
        }))
        .expect("static response shape")
    }

    /// Build a web-grounded response: one web chunk per `(title, url)` pair.
    pub fn web_response(text: &str, sources: &[(&str, &str)]) -> GenerateResponse {
        let grounding: Vec<_> = sources
            .iter()
            .map(|(title, url)| serde_json::json!({ "web": { "title": title, "uri": url } }))
            .collect();

        serde_json::from_value(serde_json::json!({
            "candidates": [ {
                "content": { "parts": [ { "text": text } ] },
                "groundingMetadata": { "groundingChunks": grounding }
            } ]
        }))
        .expect("static response shape")
    }
}

impl Default for MockClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl GenAiClient for MockClient {
    fn provider_name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, request: &GenerateRequest) -> AppResult<GenerateResponse> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());

        if let Some(delay) = self.generate_delay {
            tokio::time::sleep(delay).await;
        }

        let queued = self.generate_queue.lock().unwrap().pop_front();
        match queued {
            Some(result) => result,
            None => Ok(Self::text_response(&self.default_text)),
        }
    }

    async fn create_store(&self, display_name: &str) -> AppResult<String> {
        self.create_store_calls.fetch_add(1, Ordering::SeqCst);

        let remaining = self.store_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.store_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(AppError::provider(Some(503), "store service unavailable"));
        }

        Ok(format!(
            "fileSearchStores/mock-{}",
            display_name.to_lowercase().replace(' ', "-")
        ))
    }

    async fn list_stores(&self) -> AppResult<Vec<StoreInfo>> {
        Ok(Vec::new())
    }

    async fn upload_file(
        &self,
        _path: &Path,
        display_name: &str,
        _mime_type: &str,
    ) -> AppResult<String> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("files/mock-{display_name}"))
    }

    async fn import_file(&self, _store_name: &str, file_name: &str) -> AppResult<OperationStatus> {
        Ok(OperationStatus {
            name: Some(format!("operations/import-{file_name}")),
            done: self.polls_until_done == 0,
            error: None,
        })
    }

    async fn get_operation(&self, operation_name: &str) -> AppResult<OperationStatus> {
        let mut polls = self.poll_counts.lock().unwrap();
        *polls += 1;
        Ok(OperationStatus {
            name: Some(operation_name.to_string()),
            done: *polls >= self.polls_until_done,
            error: None,
        })
    }

    async fn create_cached_context(
        &self,
        _model: &str,
        _system_prompt: &str,
        ttl_secs: u64,
    ) -> AppResult<CachedContextInfo> {
        let call = self.cached_context_calls.fetch_add(1, Ordering::SeqCst);

        let remaining = self.cached_context_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.cached_context_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(AppError::provider(Some(500), "cachedContents unavailable"));
        }

        let expire_time = match &self.cached_context_expiry {
            Some(fixed) => fixed.clone(),
            None => {
                (chrono::Utc::now() + chrono::Duration::seconds(ttl_secs as i64)).to_rfc3339()
            }
        };
        Ok(CachedContextInfo {
            name: format!("cachedContents/mock-{call}"),
            expire_time: Some(expire_time),
            token_count: self.cached_context_tokens,
        })
    }

    async fn delete_cached_context(&self, name: &str) -> AppResult<()> {
        self.deleted_contexts.lock().unwrap().push(name.to_string());
        Ok(())
    }
}
