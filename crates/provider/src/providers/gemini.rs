//! Gemini provider implementation.
//!
//! HTTP client for the Generative Language API: grounded and ungrounded
//! generation, document store management, file upload + import operations,
//! and provider-side context caching.

use crate::client::{
    CachedContextInfo, FileInfo, GenAiClient, GenerateRequest, GenerateResponse, OperationStatus,
    StoreInfo,
};
use docent_core::{AppError, AppResult};
use serde::Deserialize;
use std::path::Path;

const API_VERSION: &str = "v1beta";

/// Gemini API client.
pub struct GeminiClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreListResponse {
    #[serde(default)]
    file_search_stores: Vec<StoreInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileUploadResponse {
    file: FileInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedContentResponse {
    name: Option<String>,
    #[serde(default)]
    expire_time: Option<String>,
    #[serde(default)]
    usage_metadata: Option<CachedContentUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedContentUsage {
    #[serde(default)]
    total_token_count: Option<u32>,
}

impl GeminiClient {
    /// Create a new client against the public endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url("https://generativelanguage.googleapis.com", api_key)
    }

    /// Create a new client with a custom base URL.
    pub fn with_base_url(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, API_VERSION, path)
    }

    /// Turn a non-success response into a provider error carrying the status.
    async fn check(response: reqwest::Response) -> AppResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        Err(AppError::provider(Some(status.as_u16()), body))
    }

    async fn post_json<B: serde::Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> AppResult<T> {
        let response = self
            .client
            .post(self.url(path))
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::provider(e.status().map(|s| s.as_u16()), e.to_string()))?;

        Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| AppError::provider(None, format!("failed to parse response: {e}")))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> AppResult<T> {
        let response = self
            .client
            .get(self.url(path))
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| AppError::provider(e.status().map(|s| s.as_u16()), e.to_string()))?;

        Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| AppError::provider(None, format!("failed to parse response: {e}")))
    }
}

#[async_trait::async_trait]
impl GenAiClient for GeminiClient {
    fn provider_name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, request: &GenerateRequest) -> AppResult<GenerateResponse> {
        tracing::debug!(model = %request.model, tools = request.tools.len(), "sending generate request");
        self.post_json(
            &format!("models/{}:generateContent", request.model),
            request,
        )
        .await
    }

    async fn create_store(&self, display_name: &str) -> AppResult<String> {
        tracing::info!(display_name, "creating document store");
        let created: StoreInfo = self
            .post_json(
                "fileSearchStores",
                &serde_json::json!({ "displayName": display_name }),
            )
            .await?;

        created.name.ok_or_else(|| {
            AppError::provider(None, "store creation response did not include a name")
        })
    }

    async fn list_stores(&self) -> AppResult<Vec<StoreInfo>> {
        let listed: StoreListResponse = self.get_json("fileSearchStores").await?;
        Ok(listed.file_search_stores)
    }

    async fn upload_file(
        &self,
        path: &Path,
        display_name: &str,
        mime_type: &str,
    ) -> AppResult<String> {
        tracing::info!(display_name, path = %path.display(), "uploading file");

        let bytes = tokio::fs::read(path).await?;
        let metadata = serde_json::json!({ "file": { "displayName": display_name } });

        let form = reqwest::multipart::Form::new()
            .part(
                "metadata",
                reqwest::multipart::Part::text(metadata.to_string())
                    .mime_str("application/json")
                    .map_err(|e| AppError::provider(None, e.to_string()))?,
            )
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes)
                    .file_name(display_name.to_string())
                    .mime_str(mime_type)
                    .map_err(|e| AppError::provider(None, e.to_string()))?,
            );

        let response = self
            .client
            .post(format!("{}/upload/{}/files", self.base_url, API_VERSION))
            .header("x-goog-api-key", &self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::provider(e.status().map(|s| s.as_u16()), e.to_string()))?;

        let uploaded: FileUploadResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| AppError::provider(None, format!("failed to parse response: {e}")))?;

        uploaded
            .file
            .name
            .ok_or_else(|| AppError::provider(None, "file upload response is missing a name"))
    }

    async fn import_file(&self, store_name: &str, file_name: &str) -> AppResult<OperationStatus> {
        tracing::info!(store_name, file_name, "importing file into store");
        self.post_json(
            &format!("{store_name}:importFile"),
            &serde_json::json!({ "fileName": file_name }),
        )
        .await
    }

    async fn get_operation(&self, operation_name: &str) -> AppResult<OperationStatus> {
        self.get_json(operation_name).await
    }

    async fn create_cached_context(
        &self,
        model: &str,
        system_prompt: &str,
        ttl_secs: u64,
    ) -> AppResult<CachedContextInfo> {
        let body = serde_json::json!({
            "model": format!("models/{model}"),
            "systemInstruction": {
                "role": "user",
                "parts": [{ "text": system_prompt }],
            },
            "ttl": format!("{ttl_secs}s"),
        });

        let created: CachedContentResponse = self.post_json("cachedContents", &body).await?;
        let name = created.name.ok_or_else(|| {
            AppError::provider(None, "cached context creation returned no name")
        })?;

        Ok(CachedContextInfo {
            name,
            expire_time: created.expire_time,
            token_count: created.usage_metadata.and_then(|u| u.total_token_count),
        })
    }

    async fn delete_cached_context(&self, name: &str) -> AppResult<()> {
        let response = self
            .client
            .delete(self.url(name))
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| AppError::provider(e.status().map(|s| s.as_u16()), e.to_string()))?;

        Self::check(response).await?;
        Ok(())
    }
}
