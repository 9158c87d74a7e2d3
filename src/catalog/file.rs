//! Per-network `config.yaml` catalog file
//!
//! ```yaml
//! items:
//!   - idxid: "001"
//!     idxname: speeding
//!     keycol: IndexableData
//!     filepath: data/hardhat/speeding.bf
//!     keysize: 64
//!     blocknum: 0
//!     callcnt: 0
//!     keycnt: 0
//!     indexdatacnt: 0
//!     schema: speeding
//! ```

use crate::catalog::error::{CatalogError, CatalogResult};
use crate::catalog::types::{CatalogEntry, IndexCounters, IndexDefinition};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// File name of the catalog inside each network directory
pub const CATALOG_FILE_NAME: &str = "config.yaml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub items: Vec<CatalogItem>,
}

/// One row of `config.yaml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub idxid: String,
    pub idxname: String,
    pub keycol: String,
    #[serde(default)]
    pub filepath: String,
    #[serde(default)]
    pub keysize: u32,
    #[serde(default)]
    pub blocknum: u64,
    #[serde(default)]
    pub callcnt: u64,
    #[serde(default)]
    pub keycnt: u64,
    #[serde(default)]
    pub indexdatacnt: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
}

impl CatalogItem {
    pub fn from_entry(entry: &CatalogEntry) -> Self {
        let def = &entry.definition;
        Self {
            idxid: def.index_id.clone(),
            idxname: def.index_name.clone(),
            keycol: def.key_column.clone(),
            filepath: def.file_path.clone(),
            keysize: def.key_size,
            blocknum: entry.counters.block_num,
            callcnt: entry.counters.call_count,
            keycnt: entry.counters.key_count,
            indexdatacnt: entry.counters.entry_count,
            schema: def.schema.clone(),
        }
    }

    pub fn into_entry(self, network: &str) -> CatalogEntry {
        CatalogEntry {
            definition: IndexDefinition {
                index_id: self.idxid,
                index_name: self.idxname,
                key_column: self.keycol,
                file_path: self.filepath,
                key_size: self.keysize,
                network: network.to_string(),
                schema: self.schema,
            },
            counters: IndexCounters {
                block_num: self.blocknum,
                call_count: self.callcnt,
                key_count: self.keycnt,
                entry_count: self.indexdatacnt,
            },
        }
    }
}

impl CatalogFile {
    /// Load from a YAML file; a missing file is an empty catalog
    pub fn load(path: &Path) -> CatalogResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str(&content).map_err(|source| CatalogError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write to a YAML file, replacing it atomically
    pub fn save(&self, path: &Path) -> CatalogResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self).map_err(|source| CatalogError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;

        let tmp = path.with_extension("yaml.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}
