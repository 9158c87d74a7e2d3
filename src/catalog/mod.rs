//! idxmngr Index Catalog
//!
//! Registry of index definitions keyed by (network, indexId):
//!
//! - **types**: `IndexDefinition`, `IndexCounters`, `CatalogEntry`
//! - **file**: per-network `config.yaml` format
//! - **registry**: `IndexCatalog` lookup and persistence
//! - **error**: error types

pub mod error;
pub mod file;
pub mod registry;
pub mod types;

pub use error::{CatalogError, CatalogResult};
pub use file::{CatalogFile, CatalogItem, CATALOG_FILE_NAME};
pub use registry::{IndexCatalog, INDEX_FILE_EXTENSION};
pub use types::{CatalogEntry, IndexCounters, IndexDefinition};
