use thiserror::Error;

/// Errors returned by the index manager client
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Index manager unavailable")]
    Unavailable,

    #[error("Request timeout")]
    Timeout,

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error {status} ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
        committed: Option<u64>,
    },

    #[error("No index '{indexing_key}' on network '{network}'")]
    NotListed {
        indexing_key: String,
        network: String,
    },

    #[error("Invalid response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ClientError {
    /// The server does not know the index; a cached id is stale
    pub fn is_index_not_found(&self) -> bool {
        match self {
            ClientError::Api { code, status, .. } => code == "INDEX_NOT_FOUND" || *status == 404,
            ClientError::NotListed { .. } => true,
            _ => false,
        }
    }

    /// Safe to retry the same request unchanged
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Timeout | ClientError::Unavailable => true,
            ClientError::Api { code, .. } => code == "TIMEOUT",
            _ => false,
        }
    }

    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ClientError::Timeout
        } else if e.is_connect() {
            ClientError::Unavailable
        } else {
            ClientError::Request(e)
        }
    }
}
