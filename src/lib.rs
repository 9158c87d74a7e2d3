//! # idxmngr
//!
//! External index manager - ordered secondary indexes over blockchain
//! transaction data. Each index maps an encoded key to the transaction ids
//! carrying it and answers comparison and range searches in key order.
//!
//! ## Modules
//!
//! - [`catalog`]: Per-network index registry persisted as `config.yaml`
//! - [`keys`]: Key schemas that turn record fields into ordered keys
//! - [`store`]: Ordered index files, single writer / many readers
//! - [`pipeline`]: Batch insert with filtering and per-record outcomes
//! - [`service`]: The index service tying the above together
//! - [`api`]: REST API server with Axum
//! - [`stream`]: WebSocket streaming inserts
//! - [`client`]: HTTP client and index id cache for callers
//! - [`config`]: TOML configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use idxmngr::catalog::IndexDefinition;
//! use idxmngr::keys::KeyEncoder;
//! use idxmngr::pipeline::InsertRecord;
//! use idxmngr::service::{IndexSelector, IndexService, InsertBatch, SearchRequest, ServiceConfig};
//! use idxmngr::store::ComparisonOp;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = IndexService::open(ServiceConfig::new("./data"), KeyEncoder::with_defaults())?;
//!
//!     service
//!         .create_index(
//!             IndexDefinition::new("001", "speeding", "IndexableData", 64, "hardhat")
//!                 .with_schema("speeding"),
//!         )
//!         .await?;
//!
//!     let record = InsertRecord::new("0xabc")
//!         .with_field("speeding", "85")
//!         .with_field("obuId", "OBU-7")
//!         .with_field("collectionDt", "2024-05-01T10:00:00");
//!     let summary = service
//!         .insert_batch(&InsertBatch::new(IndexSelector::new("001"), vec![record]))
//!         .await?;
//!     println!("{}", summary);
//!
//!     let request = SearchRequest::new(IndexSelector::new("speeding"), ComparisonOp::GtEq)
//!         .value("spd::080::");
//!     let result = service.search(&request).await?;
//!     println!("Found {} transactions", result.count);
//!
//!     service.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod catalog;
pub mod client;
pub mod config;
pub mod keys;
pub mod pipeline;
pub mod service;
pub mod store;
pub mod stream;

// Re-export top-level types for convenience
pub use catalog::{CatalogError, IndexCatalog, IndexCounters, IndexDefinition};

pub use keys::{EncodingError, KeyEncoder, KeySchema};

pub use store::{ComparisonOp, IndexStore, KeyQuery, StoreError, SyncMode};

pub use pipeline::{InclusionPredicate, InsertPipeline, InsertRecord, InsertSummary};

pub use service::{IndexService, SearchRequest, SearchResult, ServiceConfig, ServiceError};

pub use api::{build_router, serve, ApiConfig, ApiError, AppState};

pub use client::{ClientError, IndexClient, IndexDirectory, IndexIdCache};

pub use config::{Config, ConfigError, LoggingConfig};
