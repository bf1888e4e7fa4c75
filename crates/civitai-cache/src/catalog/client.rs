//! HTTP client for the Civitai REST API.
//!
//! Two reqwest clients are kept: one for JSON calls with a total request
//! timeout, and one for file downloads with only a connect timeout.

use super::types::{ModelRecord, SearchResponse, VersionRecord};
use super::CatalogSource;
use crate::config::{CacheConfig, CatalogConfig, OfflineSwitch};
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// reqwest-backed [`CatalogSource`].
pub struct CatalogClient {
    client: Client,
    download_client: Client,
    endpoint: String,
    api_token: Option<String>,
    offline: bool,
    offline_switch: OfflineSwitch,
    request_timeout: Duration,
    connect_timeout: Duration,
}

impl std::fmt::Debug for CatalogClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogClient")
            .field("endpoint", &self.endpoint)
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field("offline", &self.offline)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl CatalogClient {
    /// Build a client from the cache configuration.
    pub fn new(config: &CacheConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(CatalogConfig::USER_AGENT)
            .build()
            .map_err(|e| CacheError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                cause: None,
            })?;

        let download_client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(CatalogConfig::USER_AGENT)
            .build()
            .map_err(|e| CacheError::Network {
                message: format!("Failed to create download HTTP client: {}", e),
                cause: None,
            })?;

        Ok(Self {
            client,
            download_client,
            endpoint: config.endpoint.clone(),
            api_token: config.api_token.clone(),
            offline: config.offline,
            offline_switch: config.offline_switch.clone(),
            request_timeout: config.request_timeout,
            connect_timeout: config.connect_timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn ensure_online(&self) -> Result<()> {
        if self.offline || self.offline_switch.is_enabled() {
            Err(CacheError::OfflineMode)
        } else {
            Ok(())
        }
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn classify(&self, err: reqwest::Error) -> CacheError {
        CacheError::from_reqwest(err, self.request_timeout)
    }

    /// Downloads only run under the connect timeout.
    fn classify_download(&self, err: reqwest::Error) -> CacheError {
        CacheError::from_reqwest(err, self.connect_timeout)
    }

    /// GET a JSON document. `Ok(None)` on 404, [`CacheError::HttpStatus`] on
    /// any other non-success status.
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>> {
        self.ensure_online()?;
        debug!("GET {}", url);

        let response = self
            .authorized(self.client.get(url))
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(CacheError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| self.classify(e))?;
        Ok(Some(serde_json::from_str(&body)?))
    }
}

#[async_trait]
impl CatalogSource for CatalogClient {
    async fn model_by_id(&self, id: i64) -> Result<Option<ModelRecord>> {
        let url = format!("{}/api/v1/models/{}", self.endpoint, id);
        self.get_json(&url).await
    }

    async fn search_models(&self, query: &str) -> Result<Vec<ModelRecord>> {
        let url = format!(
            "{}/api/v1/models?query={}",
            self.endpoint,
            urlencoding::encode(query)
        );
        let response: Option<SearchResponse> = self.get_json(&url).await?;
        Ok(response.map(|r| r.items).unwrap_or_default())
    }

    async fn version_by_hash(&self, hash: &str) -> Result<Option<VersionRecord>> {
        let url = format!(
            "{}/api/v1/model-versions/by-hash/{}",
            self.endpoint,
            urlencoding::encode(hash)
        );
        self.get_json(&url).await
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        self.ensure_online()?;
        info!("Downloading {} to {}", url, dest.display());

        let response = self
            .authorized(self.download_client.get(url))
            .send()
            .await
            .map_err(|e| self.classify_download(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CacheError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| CacheError::io_with_path(e, dest))?;
        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| self.classify_download(e))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| CacheError::io_with_path(e, dest))?;
            downloaded += chunk.len() as u64;
        }

        file.flush()
            .await
            .map_err(|e| CacheError::io_with_path(e, dest))?;
        file.sync_all()
            .await
            .map_err(|e| CacheError::io_with_path(e, dest))?;

        debug!("Downloaded {} bytes from {}", downloaded, url);
        Ok(downloaded)
    }
}
