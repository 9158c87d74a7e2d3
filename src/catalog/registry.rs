//! Index Catalog registry
//!
//! Holds every definition, grouped by network. Each network maps to a
//! directory `<data_dir>/<network>/` with its own `config.yaml`.

use crate::catalog::error::{CatalogError, CatalogResult};
use crate::catalog::file::{CatalogFile, CatalogItem, CATALOG_FILE_NAME};
use crate::catalog::types::{CatalogEntry, IndexCounters, IndexDefinition};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

/// Extension of index backing files
pub const INDEX_FILE_EXTENSION: &str = "bf";

#[derive(Debug)]
pub struct IndexCatalog {
    data_dir: PathBuf,
    /// network → entries in creation order
    networks: BTreeMap<String, Vec<CatalogEntry>>,
}

impl IndexCatalog {
    /// Empty catalog rooted at `data_dir`
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            networks: BTreeMap::new(),
        }
    }

    /// Load every `<data_dir>/<network>/config.yaml`
    pub fn load(data_dir: impl Into<PathBuf>) -> CatalogResult<Self> {
        let mut catalog = Self::new(data_dir);

        if !catalog.data_dir.exists() {
            std::fs::create_dir_all(&catalog.data_dir)?;
            return Ok(catalog);
        }

        for dir_entry in std::fs::read_dir(&catalog.data_dir)? {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_dir() {
                continue;
            }
            let network = dir_entry.file_name().to_string_lossy().to_string();
            let path = dir_entry.path().join(CATALOG_FILE_NAME);
            if !path.exists() {
                continue;
            }

            let file = CatalogFile::load(&path)?;
            let entries: Vec<CatalogEntry> = file
                .items
                .into_iter()
                .map(|item| item.into_entry(&network))
                .collect();

            tracing::info!(network = %network, indexes = entries.len(), "Loaded catalog");
            catalog.networks.insert(network, entries);
        }

        Ok(catalog)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Directory holding a network's catalog and index files
    pub fn network_dir(&self, network: &str) -> PathBuf {
        self.data_dir.join(network)
    }

    pub fn catalog_path(&self, network: &str) -> PathBuf {
        self.network_dir(network).join(CATALOG_FILE_NAME)
    }

    /// Where a definition's backing file lives.
    ///
    /// Empty → `<network_dir>/<indexName>.bf`; relative → under the
    /// network directory; absolute → unchanged.
    pub fn resolve_file_path(&self, def: &IndexDefinition) -> CatalogResult<PathBuf> {
        if def.file_path.trim().is_empty() {
            return Ok(self
                .network_dir(&def.network)
                .join(format!("{}.{}", def.index_name, INDEX_FILE_EXTENSION)));
        }

        let path = Path::new(&def.file_path);
        if path.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(CatalogError::InvalidDefinition(format!(
                "file path {:?} must not contain '..'",
                def.file_path
            )));
        }

        if path.is_absolute() {
            Ok(path.to_path_buf())
        } else {
            Ok(self.network_dir(&def.network).join(path))
        }
    }

    /// Check a definition before any file is allocated for it
    pub fn validate(&self, def: &IndexDefinition) -> CatalogResult<()> {
        check_name("indexId", &def.index_id)?;
        check_name("network", &def.network)?;
        check_name("indexName", &def.index_name)?;
        if def.key_column.trim().is_empty() {
            return Err(CatalogError::InvalidDefinition(
                "keyColumn must not be empty".to_string(),
            ));
        }

        if self.get(&def.network, &def.index_id).is_some() {
            return Err(CatalogError::AlreadyExists {
                network: def.network.clone(),
                index_id: def.index_id.clone(),
            });
        }
        Ok(())
    }

    /// Register a definition whose backing file already exists, then persist
    /// the network's catalog file
    pub fn insert(&mut self, def: IndexDefinition) -> CatalogResult<&CatalogEntry> {
        self.validate(&def)?;

        let network = def.network.clone();
        let entries = self.networks.entry(network.clone()).or_default();
        entries.push(CatalogEntry {
            definition: def,
            counters: IndexCounters::default(),
        });

        if let Err(e) = self.save_network(&network) {
            // Keep memory and disk in step
            if let Some(entries) = self.networks.get_mut(&network) {
                entries.pop();
            }
            return Err(e);
        }

        self.networks
            .get(&network)
            .and_then(|entries| entries.last())
            .ok_or_else(|| CatalogError::NotFound(network))
    }

    /// Exact lookup by (network, indexId)
    pub fn get(&self, network: &str, index_id: &str) -> Option<&CatalogEntry> {
        self.networks
            .get(network)?
            .iter()
            .find(|e| e.definition.index_id == index_id)
    }

    /// Lookup by id or name. Without a network the match must be unique.
    pub fn find(&self, network: Option<&str>, id_or_name: &str) -> CatalogResult<&CatalogEntry> {
        match network.filter(|n| !n.is_empty()) {
            Some(network) => {
                let entries = self
                    .networks
                    .get(network)
                    .ok_or_else(|| CatalogError::NotFound(format!("{}/{}", network, id_or_name)))?;
                entries
                    .iter()
                    .find(|e| e.definition.index_id == id_or_name)
                    .or_else(|| entries.iter().find(|e| e.definition.index_name == id_or_name))
                    .ok_or_else(|| CatalogError::NotFound(format!("{}/{}", network, id_or_name)))
            }
            None => {
                let by_id: Vec<&CatalogEntry> = self
                    .entries()
                    .filter(|e| e.definition.index_id == id_or_name)
                    .collect();
                let matches: Vec<&CatalogEntry> = if by_id.is_empty() {
                    self.entries()
                        .filter(|e| e.definition.index_name == id_or_name)
                        .collect()
                } else {
                    by_id
                };

                match matches.as_slice() {
                    [] => Err(CatalogError::NotFound(id_or_name.to_string())),
                    [entry] => Ok(*entry),
                    many => Err(CatalogError::Ambiguous {
                        name: id_or_name.to_string(),
                        networks: many
                            .iter()
                            .map(|e| e.definition.network.as_str())
                            .collect::<Vec<_>>()
                            .join(", "),
                    }),
                }
            }
        }
    }

    /// Definitions, optionally restricted to one network
    pub fn list(&self, network: Option<&str>) -> Vec<&CatalogEntry> {
        match network.filter(|n| !n.is_empty()) {
            Some(network) => self
                .networks
                .get(network)
                .map(|entries| entries.iter().collect())
                .unwrap_or_default(),
            None => self.entries().collect(),
        }
    }

    /// Replace the stored counters of one index (in memory only)
    pub fn update_counters(
        &mut self,
        network: &str,
        index_id: &str,
        counters: IndexCounters,
    ) -> CatalogResult<()> {
        let entry = self
            .networks
            .get_mut(network)
            .and_then(|entries| entries.iter_mut().find(|e| e.definition.index_id == index_id))
            .ok_or_else(|| CatalogError::NotFound(format!("{}/{}", network, index_id)))?;
        entry.counters = counters;
        Ok(())
    }

    /// Write one network's `config.yaml`
    pub fn save_network(&self, network: &str) -> CatalogResult<()> {
        let items = self
            .networks
            .get(network)
            .map(|entries| entries.iter().map(CatalogItem::from_entry).collect())
            .unwrap_or_default();
        CatalogFile { items }.save(&self.catalog_path(network))
    }

    /// Write every network's `config.yaml`
    pub fn save(&self) -> CatalogResult<()> {
        for network in self.networks.keys() {
            self.save_network(network)?;
        }
        Ok(())
    }

    pub fn networks(&self) -> impl Iterator<Item = &str> {
        self.networks.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.networks.values().map(|v| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.networks.values().flat_map(|entries| entries.iter())
    }
}

/// Identifiers become directory and file names
fn check_name(label: &str, value: &str) -> CatalogResult<()> {
    if value.trim().is_empty() {
        return Err(CatalogError::InvalidDefinition(format!(
            "{} must not be empty",
            label
        )));
    }
    if value.contains(['/', '\\']) || value == "." || value == ".." {
        return Err(CatalogError::InvalidDefinition(format!(
            "{} {:?} must not contain path separators",
            label, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn speeding(network: &str) -> IndexDefinition {
        IndexDefinition::new("001", "speeding", "IndexableData", 64, network)
    }

    #[test]
    fn test_insert_and_get() {
        let dir = tempdir().unwrap();
        let mut catalog = IndexCatalog::new(dir.path());

        catalog.insert(speeding("hardhat")).unwrap();
        let entry = catalog.get("hardhat", "001").unwrap();
        assert_eq!(entry.definition.index_name, "speeding");
        assert_eq!(entry.counters, IndexCounters::default());
        assert!(catalog.catalog_path("hardhat").exists());
    }

    #[test]
    fn test_duplicate_rejected() {
        let dir = tempdir().unwrap();
        let mut catalog = IndexCatalog::new(dir.path());

        catalog.insert(speeding("hardhat")).unwrap();
        let err = catalog.insert(speeding("hardhat")).unwrap_err();
        assert!(matches!(err, CatalogError::AlreadyExists { .. }));
        assert_eq!(catalog.len(), 1);

        // Same id on another network is a different index
        catalog.insert(speeding("sepolia")).unwrap();
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn test_resolve_file_path() {
        let dir = tempdir().unwrap();
        let catalog = IndexCatalog::new(dir.path());

        let def = speeding("hardhat");
        assert_eq!(
            catalog.resolve_file_path(&def).unwrap(),
            dir.path().join("hardhat").join("speeding.bf")
        );

        let def = speeding("hardhat").with_file_path("custom.bf");
        assert_eq!(
            catalog.resolve_file_path(&def).unwrap(),
            dir.path().join("hardhat").join("custom.bf")
        );

        let abs = dir.path().join("elsewhere.bf");
        let def = speeding("hardhat").with_file_path(abs.to_string_lossy());
        assert_eq!(catalog.resolve_file_path(&def).unwrap(), abs);

        let def = speeding("hardhat").with_file_path("../escape.bf");
        assert!(catalog.resolve_file_path(&def).is_err());
    }

    #[test]
    fn test_invalid_definitions() {
        let dir = tempdir().unwrap();
        let catalog = IndexCatalog::new(dir.path());

        assert!(catalog
            .validate(&IndexDefinition::new("", "n", "c", 8, "net"))
            .is_err());
        assert!(catalog
            .validate(&IndexDefinition::new("a/b", "n", "c", 8, "net"))
            .is_err());
        assert!(catalog
            .validate(&IndexDefinition::new("a", "n", "", 8, "net"))
            .is_err());
        assert!(catalog
            .validate(&IndexDefinition::new("a", "n", "c", 8, ".."))
            .is_err());
    }

    #[test]
    fn test_find_by_id_or_name() {
        let dir = tempdir().unwrap();
        let mut catalog = IndexCatalog::new(dir.path());
        catalog.insert(speeding("hardhat")).unwrap();
        catalog
            .insert(IndexDefinition::new("002", "purpose", "purpose", 32, "hardhat"))
            .unwrap();

        assert_eq!(
            catalog.find(Some("hardhat"), "speeding").unwrap().definition.index_id,
            "001"
        );
        assert_eq!(
            catalog.find(None, "002").unwrap().definition.index_name,
            "purpose"
        );
        assert!(matches!(
            catalog.find(Some("hardhat"), "missing"),
            Err(CatalogError::NotFound(_))
        ));
        assert!(matches!(
            catalog.find(Some("unknown-net"), "001"),
            Err(CatalogError::NotFound(_))
        ));
    }

    #[test]
    fn test_find_ambiguous_without_network() {
        let dir = tempdir().unwrap();
        let mut catalog = IndexCatalog::new(dir.path());
        catalog.insert(speeding("hardhat")).unwrap();
        catalog.insert(speeding("sepolia")).unwrap();

        assert!(matches!(
            catalog.find(None, "speeding"),
            Err(CatalogError::Ambiguous { .. })
        ));
        assert!(catalog.find(Some("sepolia"), "speeding").is_ok());
    }

    #[test]
    fn test_list_filters_by_network() {
        let dir = tempdir().unwrap();
        let mut catalog = IndexCatalog::new(dir.path());
        catalog.insert(speeding("hardhat")).unwrap();
        catalog.insert(speeding("sepolia")).unwrap();

        assert_eq!(catalog.list(None).len(), 2);
        assert_eq!(catalog.list(Some("hardhat")).len(), 1);
        assert!(catalog.list(Some("mainnet")).is_empty());
    }

    #[test]
    fn test_reload_keeps_definitions_and_counters() {
        let dir = tempdir().unwrap();

        {
            let mut catalog = IndexCatalog::new(dir.path());
            catalog
                .insert(speeding("hardhat").with_schema("speeding"))
                .unwrap();
            catalog
                .update_counters(
                    "hardhat",
                    "001",
                    IndexCounters {
                        block_num: 42,
                        call_count: 7,
                        key_count: 3,
                        entry_count: 4,
                    },
                )
                .unwrap();
            catalog.save().unwrap();
        }

        let catalog = IndexCatalog::load(dir.path()).unwrap();
        let entry = catalog.get("hardhat", "001").unwrap();
        assert_eq!(entry.definition.schema.as_deref(), Some("speeding"));
        assert_eq!(entry.counters.block_num, 42);
        assert_eq!(entry.counters.entry_count, 4);
        assert_eq!(catalog.networks().collect::<Vec<_>>(), vec!["hardhat"]);
    }
}
