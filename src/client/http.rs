//! HTTP client for the index manager API

use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::cache::IndexDirectory;
use super::error::ClientError;
use crate::api::dto::{
    BatchInsertRequest, CreateIndexRequest, CreateIndexResponse, Envelope, HealthResponse,
    IndexInfoRequest, IndexInfoResponse, IndexSummary, InsertRequest, ListIndexesRequest,
    ListIndexesResponse, SearchIndexRequest, SearchIndexResponse,
};
use crate::pipeline::InsertSummary;

/// Configuration for the index manager client
#[derive(Debug, Clone)]
pub struct IndexClientConfig {
    /// Base URL of the API (e.g., "http://localhost:8083")
    pub base_url: String,
    /// Request timeout in milliseconds
    pub request_timeout_ms: u64,
}

impl Default for IndexClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8083".to_string(),
            request_timeout_ms: 30_000,
        }
    }
}

impl IndexClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }
}

/// Error body returned by the API
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    code: String,
    #[serde(default)]
    committed: Option<u64>,
}

/// Index manager REST API client
#[derive(Debug, Clone)]
pub struct IndexClient {
    client: Client,
    config: IndexClientConfig,
}

impl IndexClient {
    pub fn new(config: IndexClientConfig) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self { client, config })
    }

    /// Get the current configuration
    pub fn config(&self) -> &IndexClientConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// GET /health
    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        let response = self
            .client
            .get(self.url("/health"))
            .send()
            .await
            .map_err(ClientError::from_reqwest)?;

        let status = response.status();
        let text = response.text().await.map_err(ClientError::from_reqwest)?;
        if !status.is_success() {
            return Err(api_error(status, &text));
        }
        Ok(serde_json::from_str(&text)?)
    }

    pub async fn list_indexes(
        &self,
        network: Option<&str>,
    ) -> Result<Vec<IndexSummary>, ClientError> {
        let body = ListIndexesRequest {
            network: network.map(str::to_string),
        };
        let response: ListIndexesResponse = self.post("/api/index/list", &body).await?;
        Ok(response.indexes)
    }

    pub async fn index_info(
        &self,
        id_or_name: &str,
        network: Option<&str>,
    ) -> Result<IndexInfoResponse, ClientError> {
        let body = IndexInfoRequest {
            index_id: Some(id_or_name.to_string()),
            index_name: None,
            network: network.map(str::to_string),
        };
        self.post("/api/index/info", &body).await
    }

    pub async fn create_index(
        &self,
        request: &CreateIndexRequest,
    ) -> Result<CreateIndexResponse, ClientError> {
        self.post("/api/index/create", request).await
    }

    pub async fn search(
        &self,
        request: &SearchIndexRequest,
    ) -> Result<SearchIndexResponse, ClientError> {
        self.post("/api/index/search", request).await
    }

    pub async fn insert(&self, request: &InsertRequest) -> Result<InsertSummary, ClientError> {
        self.post("/api/index/insert", request).await
    }

    /// Insert a batch; a partially failed batch still returns its summary
    pub async fn insert_batch(
        &self,
        request: &BatchInsertRequest,
    ) -> Result<InsertSummary, ClientError> {
        self.post("/api/index/insert/batch", request).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(ClientError::from_reqwest)?;

        let status = response.status();
        let text = response.text().await.map_err(ClientError::from_reqwest)?;
        decode_envelope(status, &text)
    }
}

/// Decode an API response body into its `data` payload
///
/// Insert summaries come back inside the envelope even on 422, so any
/// body carrying `data` is returned as-is.
fn decode_envelope<T: DeserializeOwned>(status: StatusCode, text: &str) -> Result<T, ClientError> {
    match serde_json::from_str::<Envelope<T>>(text) {
        Ok(envelope) => Ok(envelope.data),
        Err(e) if status.is_success() => Err(ClientError::Decode(e)),
        Err(_) => Err(api_error(status, text)),
    }
}

fn api_error(status: StatusCode, text: &str) -> ClientError {
    match serde_json::from_str::<ErrorBody>(text) {
        Ok(body) => ClientError::Api {
            status: status.as_u16(),
            code: body.code,
            message: body.error,
            committed: body.committed,
        },
        Err(_) => ClientError::Api {
            status: status.as_u16(),
            code: String::new(),
            message: text.to_string(),
            committed: None,
        },
    }
}

#[async_trait::async_trait]
impl IndexDirectory for IndexClient {
    async fn resolve_index_id(
        &self,
        indexing_key: &str,
        network: &str,
    ) -> Result<String, ClientError> {
        let network_filter = Some(network).filter(|n| !n.is_empty());
        let indexes = self.list_indexes(network_filter).await?;

        indexes
            .into_iter()
            .find(|idx| idx.index_name == indexing_key || idx.indexing_key == indexing_key)
            .map(|idx| idx.index_id)
            .ok_or_else(|| ClientError::NotListed {
                indexing_key: indexing_key.to_string(),
                network: network.to_string(),
            })
    }
}
