//! Catalog data types

use serde::{Deserialize, Serialize};
use std::fmt;

/// A registered index. Immutable once created; only its counters change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDefinition {
    pub index_id: String,
    pub index_name: String,
    /// Record field the index is built over
    pub key_column: String,
    /// Backing `.bf` file; resolved when the index is created
    pub file_path: String,
    /// Maximum encoded key length in bytes (0 = unlimited)
    pub key_size: u32,
    pub network: String,
    /// Key schema applied when an insert names none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
}

impl IndexDefinition {
    pub fn new(
        index_id: impl Into<String>,
        index_name: impl Into<String>,
        key_column: impl Into<String>,
        key_size: u32,
        network: impl Into<String>,
    ) -> Self {
        Self {
            index_id: index_id.into(),
            index_name: index_name.into(),
            key_column: key_column.into(),
            file_path: String::new(),
            key_size,
            network: network.into(),
            schema: None,
        }
    }

    pub fn with_file_path(mut self, path: impl Into<String>) -> Self {
        self.file_path = path.into();
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Whether the definition is addressed by this id or name
    pub fn matches(&self, id_or_name: &str) -> bool {
        self.index_id == id_or_name || self.index_name == id_or_name
    }
}

impl fmt::Display for IndexDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} ({}, key={}, size={})",
            self.network, self.index_id, self.index_name, self.key_column, self.key_size
        )
    }
}

/// Derived counters persisted alongside a definition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexCounters {
    /// Highest block number seen on inserts
    pub block_num: u64,
    /// Searches served
    pub call_count: u64,
    /// Unique keys
    pub key_count: u64,
    /// (key, txId) entries
    pub entry_count: u64,
}

/// A definition plus its counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub definition: IndexDefinition,
    pub counters: IndexCounters,
}
