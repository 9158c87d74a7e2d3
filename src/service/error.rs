//! Service error taxonomy
//!
//! Every failure surfaced to callers falls in one of these classes:
//!
//! | Variant         | Caller action                         |
//! |-----------------|---------------------------------------|
//! | `IndexNotFound` | re-list and retry                     |
//! | `AlreadyExists` | treat as success if idempotent        |
//! | `Encoding`      | fix the record                        |
//! | `InvalidQuery`  | fix the request                       |
//! | `Io`            | operator intervention for that index  |
//! | `Timeout`       | safe to retry                         |

use crate::catalog::CatalogError;
use crate::keys::EncodingError;
use crate::pipeline::{PipelineError, PredicateError};
use crate::store::StoreError;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Index not found: {0}")]
    IndexNotFound(String),

    #[error("Index '{index_id}' already exists on network '{network}'")]
    AlreadyExists { network: String, index_id: String },

    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("IO error on {context}{}: {source}", committed_suffix(.committed))]
    Io {
        context: String,
        committed: Option<u64>,
        #[source]
        source: BoxError,
    },

    #[error("{operation} timed out after {elapsed_ms} ms{}", committed_suffix(.committed))]
    Timeout {
        operation: String,
        elapsed_ms: u64,
        committed: Option<u64>,
    },
}

fn committed_suffix(committed: &Option<u64>) -> String {
    match committed {
        Some(n) => format!(" ({} records committed)", n),
        None => String::new(),
    }
}

impl ServiceError {
    pub fn io(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        ServiceError::Io {
            context: context.into(),
            committed: None,
            source: source.into(),
        }
    }

    /// Stable error code for the wire
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::IndexNotFound(_) => "INDEX_NOT_FOUND",
            ServiceError::AlreadyExists { .. } => "ALREADY_EXISTS",
            ServiceError::Encoding(_) => "ENCODING_ERROR",
            ServiceError::InvalidQuery(_) => "INVALID_QUERY",
            ServiceError::Io { .. } => "IO_ERROR",
            ServiceError::Timeout { .. } => "TIMEOUT",
        }
    }

    /// Whether retrying the same request can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceError::Timeout { .. } | ServiceError::IndexNotFound(_)
        )
    }

    /// Convert a store error raised while serving `context`
    pub fn from_store(context: impl Into<String>, err: StoreError) -> Self {
        let context = context.into();
        match err {
            StoreError::FileNotFound(_) => ServiceError::IndexNotFound(context),
            StoreError::KeyTooLarge { len, max } => {
                ServiceError::Encoding(EncodingError::KeyTooLong { len, max })
            }
            other => ServiceError::io(context, other),
        }
    }

    /// Convert a batch that stopped early
    pub fn from_pipeline(context: impl Into<String>, err: PipelineError) -> Self {
        let context = context.into();
        match err {
            PipelineError::Timeout { summary } => ServiceError::Timeout {
                operation: format!("insert into {}", context),
                elapsed_ms: summary.duration_ms,
                committed: Some(summary.inserted),
            },
            PipelineError::Storage { summary, source } => ServiceError::Io {
                context,
                committed: Some(summary.inserted),
                source: Box::new(source),
            },
        }
    }
}

impl From<CatalogError> for ServiceError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound(what) => ServiceError::IndexNotFound(what),
            CatalogError::AlreadyExists { network, index_id } => {
                ServiceError::AlreadyExists { network, index_id }
            }
            CatalogError::Ambiguous { .. } | CatalogError::InvalidDefinition(_) => {
                ServiceError::InvalidQuery(err.to_string())
            }
            other => ServiceError::io("catalog", other),
        }
    }
}

impl From<PredicateError> for ServiceError {
    fn from(err: PredicateError) -> Self {
        ServiceError::InvalidQuery(err.to_string())
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::InsertSummary;

    #[test]
    fn test_catalog_mapping() {
        let err: ServiceError = CatalogError::NotFound("hardhat/x".into()).into();
        assert!(matches!(err, ServiceError::IndexNotFound(_)));

        let err: ServiceError = CatalogError::Ambiguous {
            name: "speeding".into(),
            networks: "a, b".into(),
        }
        .into();
        assert_eq!(err.code(), "INVALID_QUERY");
    }

    #[test]
    fn test_pipeline_mapping_reports_committed() {
        let summary = InsertSummary {
            inserted: 7,
            duration_ms: 12,
            ..Default::default()
        };
        let err = ServiceError::from_pipeline("hardhat/001", PipelineError::Timeout { summary });
        assert!(matches!(
            err,
            ServiceError::Timeout {
                committed: Some(7),
                ..
            }
        ));
        assert!(err.to_string().contains("7 records committed"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_store_mapping() {
        let err = ServiceError::from_store(
            "hardhat/001",
            StoreError::FileNotFound("x.bf".into()),
        );
        assert!(matches!(err, ServiceError::IndexNotFound(_)));

        let err = ServiceError::from_store(
            "hardhat/001",
            StoreError::Corruption {
                path: "x.bf".into(),
                reason: "bad crc".into(),
            },
        );
        assert_eq!(err.code(), "IO_ERROR");
        assert!(!err.is_retryable());
    }
}
