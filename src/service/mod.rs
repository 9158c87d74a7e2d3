//! idxmngr Query Service
//!
//! The [`IndexService`] ties the catalog, the key encoder, the per-index
//! stores and the insert pipeline together:
//!
//! ```text
//! create_index → catalog.validate → IndexStore::create → catalog.insert
//! insert_batch → lookup → InsertPipeline::run(store) → counters
//! search       → lookup → SearchRequest::to_query → store.search (bounded)
//! ```
//!
//! Each index owns its own store, so work on one index never waits on
//! another. Counters are kept in memory and written back to the catalog by
//! a background task and at shutdown.

pub mod error;
pub mod types;

pub use error::{ServiceError, ServiceResult};
pub use types::{IndexFilter, IndexInfo, IndexSelector, InsertBatch, SearchRequest, SearchResult};

use crate::catalog::{IndexCatalog, IndexCounters, IndexDefinition};
use crate::keys::KeyEncoder;
use crate::pipeline::{InsertPipeline, InsertSummary};
use crate::store::{IndexStore, StoreError, SyncMode};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{interval, Duration, Instant};

/// Settings of the service core
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Root directory holding one subdirectory per network
    pub data_dir: PathBuf,
    pub sync_mode: SyncMode,
    /// Interval of the counter flush task in milliseconds
    pub flush_interval_ms: u64,
    /// Deadline for a single search or insert batch (0 = none)
    pub operation_timeout_ms: u64,
    pub max_batch_size: usize,
    pub filters: Vec<IndexFilter>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            sync_mode: SyncMode::Batched,
            flush_interval_ms: 5000,
            operation_timeout_ms: 30_000,
            max_batch_size: 10_000,
            filters: Vec::new(),
        }
    }
}

impl ServiceConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    fn operation_timeout(&self) -> Option<Duration> {
        (self.operation_timeout_ms > 0).then(|| Duration::from_millis(self.operation_timeout_ms))
    }
}

type IndexKey = (String, String);

/// An open index and its live counters
pub struct IndexHandle {
    pub definition: IndexDefinition,
    pub store: IndexStore,
    call_count: AtomicU64,
    block_num: AtomicU64,
}

impl IndexHandle {
    fn new(definition: IndexDefinition, store: IndexStore, counters: IndexCounters) -> Self {
        Self {
            definition,
            store,
            call_count: AtomicU64::new(counters.call_count),
            block_num: AtomicU64::new(counters.block_num),
        }
    }

    pub async fn counters(&self) -> IndexCounters {
        let stats = self.store.stats().await;
        IndexCounters {
            block_num: self.block_num.load(Ordering::Relaxed),
            call_count: self.call_count.load(Ordering::Relaxed),
            key_count: stats.key_count,
            entry_count: stats.entry_count,
        }
    }

    pub async fn info(&self) -> IndexInfo {
        let stats = self.store.stats().await;
        IndexInfo {
            definition: self.definition.clone(),
            counters: self.counters().await,
            file_size_bytes: stats.file_size_bytes,
            available: self.store.failure().is_none(),
            failure: self.store.failure().map(|s| s.to_string()),
        }
    }

    fn label(&self) -> String {
        format!("{}/{}", self.definition.network, self.definition.index_id)
    }
}

/// An index listed in the catalog whose file could not be opened
#[derive(Debug, Clone)]
struct Unavailable {
    definition: IndexDefinition,
    counters: IndexCounters,
    missing: bool,
    reason: String,
}

enum Slot {
    Ready(Arc<IndexHandle>),
    Unavailable(Unavailable),
}

pub struct IndexService {
    config: ServiceConfig,
    encoder: KeyEncoder,
    catalog: RwLock<IndexCatalog>,
    indexes: RwLock<HashMap<IndexKey, Slot>>,
    shutdown: AtomicBool,
}

impl IndexService {
    /// Load the catalog and open every index file it lists
    pub fn open(config: ServiceConfig, encoder: KeyEncoder) -> ServiceResult<Self> {
        let catalog = IndexCatalog::load(&config.data_dir)?;
        let mut indexes = HashMap::new();

        for entry in catalog.list(None) {
            let def = entry.definition.clone();
            let key = (def.network.clone(), def.index_id.clone());

            let slot = match IndexStore::open(&def.file_path, def.key_size, config.sync_mode) {
                Ok(store) => Slot::Ready(Arc::new(IndexHandle::new(def, store, entry.counters))),
                Err(e) => {
                    tracing::error!(
                        network = %def.network,
                        index_id = %def.index_id,
                        path = %def.file_path,
                        error = %e,
                        "Failed to open index"
                    );
                    Slot::Unavailable(Unavailable {
                        missing: matches!(e, StoreError::FileNotFound(_)),
                        reason: e.to_string(),
                        counters: entry.counters,
                        definition: def,
                    })
                }
            };
            indexes.insert(key, slot);
        }

        tracing::info!(
            data_dir = ?config.data_dir,
            indexes = indexes.len(),
            schemas = ?encoder.names(),
            "Index service opened"
        );

        Ok(Self {
            config,
            encoder,
            catalog: RwLock::new(catalog),
            indexes: RwLock::new(indexes),
            shutdown: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn encoder(&self) -> &KeyEncoder {
        &self.encoder
    }

    /// Register a new index and allocate its backing file
    pub async fn create_index(&self, mut def: IndexDefinition) -> ServiceResult<IndexInfo> {
        let mut catalog = self.catalog.write().await;
        catalog.validate(&def)?;

        if let Some(schema) = def.schema.as_deref().filter(|s| !s.is_empty()) {
            if self.encoder.get(schema).is_none() {
                return Err(crate::keys::EncodingError::UnknownSchema(schema.to_string()).into());
            }
        }

        let path = catalog.resolve_file_path(&def)?;
        def.file_path = path.to_string_lossy().to_string();
        let label = format!("{}/{}", def.network, def.index_id);

        let store = match IndexStore::create(&path, def.key_size, self.config.sync_mode) {
            Ok(store) => store,
            Err(StoreError::Io(e)) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                tracing::warn!(path = ?path, "Index file exists but is not in the catalog");
                return Err(ServiceError::AlreadyExists {
                    network: def.network,
                    index_id: def.index_id,
                });
            }
            Err(e) => return Err(ServiceError::from_store(label, e)),
        };

        if let Err(e) = catalog.insert(def.clone()) {
            drop(store);
            if let Err(rm) = std::fs::remove_file(&path) {
                tracing::warn!(path = ?path, error = %rm, "Failed to remove index file");
            }
            return Err(e.into());
        }

        tracing::info!(
            network = %def.network,
            index_id = %def.index_id,
            name = %def.index_name,
            path = ?path,
            "Created index"
        );

        let handle = Arc::new(IndexHandle::new(
            def.clone(),
            store,
            IndexCounters::default(),
        ));
        let info = handle.info().await;
        self.indexes
            .write()
            .await
            .insert((def.network, def.index_id), Slot::Ready(handle));
        Ok(info)
    }

    /// Definitions with counters, optionally for one network
    pub async fn list_indexes(&self, network: Option<&str>) -> Vec<IndexInfo> {
        let keys: Vec<IndexKey> = {
            let catalog = self.catalog.read().await;
            catalog
                .list(network)
                .into_iter()
                .map(|e| (e.definition.network.clone(), e.definition.index_id.clone()))
                .collect()
        };

        let indexes = self.indexes.read().await;
        let mut infos = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(slot) = indexes.get(&key) {
                infos.push(slot_info(slot).await);
            }
        }
        infos
    }

    /// One definition with counters
    pub async fn get_index_info(&self, selector: &IndexSelector) -> ServiceResult<IndexInfo> {
        let key = self.resolve_key(selector).await?;
        let indexes = self.indexes.read().await;
        let slot = indexes
            .get(&key)
            .ok_or_else(|| ServiceError::IndexNotFound(selector.to_string()))?;
        Ok(slot_info(slot).await)
    }

    /// Matching txIds, in ascending key order
    pub async fn search(&self, request: &SearchRequest) -> ServiceResult<SearchResult> {
        let started = Instant::now();
        let handle = self.handle(&request.selector).await?;
        let query = request.to_query(&handle.definition, &self.encoder)?;

        handle.call_count.fetch_add(1, Ordering::Relaxed);

        let search = handle.store.search_limited(&query, request.limit);
        let result = match self.config.operation_timeout() {
            Some(limit) => tokio::time::timeout(limit, search).await.map_err(|_| {
                ServiceError::Timeout {
                    operation: format!("search on {}", handle.label()),
                    elapsed_ms: started.elapsed().as_millis() as u64,
                    committed: None,
                }
            })?,
            None => search.await,
        };
        let tx_ids = result.map_err(|e| ServiceError::from_store(handle.label(), e))?;

        let duration_ms = started.elapsed().as_millis() as u64;
        tracing::debug!(
            index = %handle.label(),
            query = %query,
            matches = tx_ids.len(),
            duration_ms,
            "Search served"
        );

        Ok(SearchResult {
            index_id: handle.definition.index_id.clone(),
            network: handle.definition.network.clone(),
            count: tx_ids.len(),
            tx_ids,
            duration_ms,
        })
    }

    /// Encode and insert one batch; each batch commits independently
    pub async fn insert_batch(&self, batch: &InsertBatch) -> ServiceResult<InsertSummary> {
        if batch.records.len() > self.config.max_batch_size {
            return Err(ServiceError::InvalidQuery(format!(
                "batch of {} records exceeds the maximum of {}",
                batch.records.len(),
                self.config.max_batch_size
            )));
        }

        let handle = self.handle(&batch.selector).await?;
        let def = &handle.definition;

        let predicate = match &batch.filter {
            Some(filter) => {
                filter.validate()?;
                Some(filter)
            }
            None => self
                .config
                .filters
                .iter()
                .find(|f| f.applies_to(def))
                .map(|f| &f.predicate),
        };

        let deadline = self.config.operation_timeout().map(|d| Instant::now() + d);

        let summary = InsertPipeline::new(&self.encoder, def)
            .schema(batch.schema.as_deref())
            .predicate(predicate)
            .deadline(deadline)
            .run(&handle.store, &batch.records)
            .await
            .map_err(|e| {
                if let Some(block) = e.summary().max_block_number {
                    handle.block_num.fetch_max(block, Ordering::Relaxed);
                }
                ServiceError::from_pipeline(handle.label(), e)
            })?;

        if let Some(block) = summary.max_block_number {
            handle.block_num.fetch_max(block, Ordering::Relaxed);
        }

        tracing::info!(
            index = %handle.label(),
            inserted = summary.inserted,
            skipped = summary.skipped,
            failed = summary.failed,
            duration_ms = summary.duration_ms,
            "Insert batch processed"
        );
        Ok(summary)
    }

    /// Write live counters back to every network's `config.yaml`
    pub async fn flush_counters(&self) -> ServiceResult<()> {
        let mut updates = Vec::new();
        {
            let indexes = self.indexes.read().await;
            for (key, slot) in indexes.iter() {
                if let Slot::Ready(handle) = slot {
                    updates.push((key.clone(), handle.counters().await));
                }
            }
        }

        let mut catalog = self.catalog.write().await;
        let mut changed = false;
        for ((network, index_id), counters) in updates {
            let current = catalog.get(&network, &index_id).map(|e| e.counters);
            if current != Some(counters) {
                catalog.update_counters(&network, &index_id, counters)?;
                changed = true;
            }
        }

        if changed {
            catalog.save()?;
            tracing::debug!("Catalog counters flushed");
        }
        Ok(())
    }

    /// Start the periodic counter flush
    pub fn start_background_flush(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let service = Arc::clone(self);
        let flush_interval = Duration::from_millis(service.config.flush_interval_ms.max(1));

        tokio::spawn(async move {
            let mut ticker = interval(flush_interval);

            loop {
                ticker.tick().await;

                if service.shutdown.load(Ordering::Relaxed) {
                    break;
                }

                if let Err(e) = service.flush_counters().await {
                    tracing::error!("Background counter flush failed: {}", e);
                }
            }
        })
    }

    /// Stop background work and persist counters
    pub async fn shutdown(&self) -> ServiceResult<()> {
        self.shutdown.store(true, Ordering::Relaxed);
        self.flush_counters().await?;
        tracing::info!("Index service shut down");
        Ok(())
    }

    /// (total, unavailable) index counts
    pub async fn health(&self) -> (usize, usize) {
        let indexes = self.indexes.read().await;
        let unavailable = indexes
            .values()
            .filter(|slot| match slot {
                Slot::Ready(handle) => handle.store.failure().is_some(),
                Slot::Unavailable(_) => true,
            })
            .count();
        (indexes.len(), unavailable)
    }

    async fn resolve_key(&self, selector: &IndexSelector) -> ServiceResult<IndexKey> {
        let catalog = self.catalog.read().await;
        let entry = catalog.find(selector.network(), &selector.id_or_name)?;
        Ok((
            entry.definition.network.clone(),
            entry.definition.index_id.clone(),
        ))
    }

    async fn handle(&self, selector: &IndexSelector) -> ServiceResult<Arc<IndexHandle>> {
        let key = self.resolve_key(selector).await?;
        let indexes = self.indexes.read().await;
        match indexes.get(&key) {
            Some(Slot::Ready(handle)) => Ok(Arc::clone(handle)),
            Some(Slot::Unavailable(u)) if u.missing => Err(ServiceError::IndexNotFound(format!(
                "{}/{} (backing file missing)",
                key.0, key.1
            ))),
            Some(Slot::Unavailable(u)) => Err(ServiceError::io(
                format!("{}/{}", key.0, key.1),
                u.reason.clone(),
            )),
            None => Err(ServiceError::IndexNotFound(selector.to_string())),
        }
    }
}

async fn slot_info(slot: &Slot) -> IndexInfo {
    match slot {
        Slot::Ready(handle) => handle.info().await,
        Slot::Unavailable(u) => IndexInfo {
            definition: u.definition.clone(),
            counters: u.counters,
            file_size_bytes: 0,
            available: false,
            failure: Some(u.reason.clone()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{InclusionPredicate, InsertRecord};
    use crate::store::ComparisonOp;
    use tempfile::tempdir;

    fn open(dir: &tempfile::TempDir) -> IndexService {
        IndexService::open(ServiceConfig::new(dir.path()), KeyEncoder::with_defaults()).unwrap()
    }

    fn speeding_def() -> IndexDefinition {
        IndexDefinition::new("001", "speeding", "IndexableData", 64, "hardhat")
            .with_schema("speeding")
    }

    fn speeding_record(tx: &str, speed: u32) -> InsertRecord {
        InsertRecord::new(tx)
            .with_field("speeding", speed.to_string())
            .with_field("obuId", "OBU-1")
            .with_field("collectionDt", "20240101120000")
    }

    #[tokio::test]
    async fn test_speeding_end_to_end() {
        let dir = tempdir().unwrap();
        let service = open(&dir);
        service.create_index(speeding_def()).await.unwrap();

        let records = vec![
            speeding_record("tx95", 95),
            speeding_record("tx55", 55),
            speeding_record("tx80", 80),
            speeding_record("tx60", 60),
        ];
        let summary = service
            .insert_batch(&InsertBatch::new(IndexSelector::new("001"), records))
            .await
            .unwrap();
        assert_eq!(summary.inserted, 4);

        let request = SearchRequest::new(
            IndexSelector::new("speeding").on_network("hardhat"),
            ComparisonOp::GtEq,
        )
        .value("spd::060::");
        let result = service.search(&request).await.unwrap();
        assert_eq!(result.tx_ids, vec!["tx60", "tx80", "tx95"]);
        assert_eq!(result.count, 3);
    }

    #[tokio::test]
    async fn test_create_twice_is_rejected() {
        let dir = tempdir().unwrap();
        let service = open(&dir);

        let info = service.create_index(speeding_def()).await.unwrap();
        let path = std::path::PathBuf::from(&info.definition.file_path);
        assert!(path.exists());
        let size = std::fs::metadata(&path).unwrap().len();

        let err = service.create_index(speeding_def()).await.unwrap_err();
        assert!(matches!(err, ServiceError::AlreadyExists { .. }));
        assert_eq!(std::fs::metadata(&path).unwrap().len(), size);
        assert_eq!(service.list_indexes(None).await.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_index_and_schema() {
        let dir = tempdir().unwrap();
        let service = open(&dir);

        let err = service
            .get_index_info(&IndexSelector::new("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::IndexNotFound(_)));

        let err = service
            .create_index(speeding_def().with_schema("nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Encoding(_)));
    }

    #[tokio::test]
    async fn test_batch_size_limit() {
        let dir = tempdir().unwrap();
        let mut config = ServiceConfig::new(dir.path());
        config.max_batch_size = 2;
        let service = IndexService::open(config, KeyEncoder::with_defaults()).unwrap();
        service.create_index(speeding_def()).await.unwrap();

        let records = (0..3).map(|i| speeding_record(&format!("tx{}", i), 70)).collect();
        let err = service
            .insert_batch(&InsertBatch::new(IndexSelector::new("001"), records))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn test_configured_and_batch_filters() {
        let dir = tempdir().unwrap();
        let mut config = ServiceConfig::new(dir.path());
        config.filters.push(IndexFilter {
            index: "speeding".into(),
            network: None,
            predicate: InclusionPredicate::new("speeding", ComparisonOp::GtEq, 60.0),
        });
        let service = IndexService::open(config, KeyEncoder::with_defaults()).unwrap();
        service.create_index(speeding_def()).await.unwrap();

        let records = vec![speeding_record("slow", 40), speeding_record("fast", 90)];
        let summary = service
            .insert_batch(&InsertBatch::new(IndexSelector::new("001"), records.clone()))
            .await
            .unwrap();
        assert_eq!((summary.inserted, summary.skipped), (1, 1));

        let mut batch = InsertBatch::new(IndexSelector::new("001"), records);
        batch.filter = Some(InclusionPredicate::new("speeding", ComparisonOp::GtEq, 0.0));
        let summary = service.insert_batch(&batch).await.unwrap();
        // "fast" is now a duplicate, "slow" passes the looser filter
        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.skipped, 1);
    }

    #[tokio::test]
    async fn test_counters_survive_restart() {
        let dir = tempdir().unwrap();

        {
            let service = open(&dir);
            service.create_index(speeding_def()).await.unwrap();
            let records = vec![
                speeding_record("a", 70).with_block_number(100),
                speeding_record("b", 71).with_block_number(120),
            ];
            service
                .insert_batch(&InsertBatch::new(IndexSelector::new("001"), records))
                .await
                .unwrap();
            let request = SearchRequest::new(IndexSelector::new("001"), ComparisonOp::GtEq)
                .value("spd::");
            service.search(&request).await.unwrap();
            service.shutdown().await.unwrap();
        }

        let service = open(&dir);
        let info = service
            .get_index_info(&IndexSelector::new("speeding"))
            .await
            .unwrap();
        assert_eq!(info.counters.block_num, 120);
        assert_eq!(info.counters.call_count, 1);
        assert_eq!(info.counters.key_count, 2);
        assert_eq!(info.counters.entry_count, 2);
        assert!(info.available);
    }

    #[tokio::test]
    async fn test_missing_backing_file() {
        let dir = tempdir().unwrap();
        let path = {
            let service = open(&dir);
            let info = service.create_index(speeding_def()).await.unwrap();
            info.definition.file_path
        };
        std::fs::remove_file(&path).unwrap();

        let service = open(&dir);
        let infos = service.list_indexes(Some("hardhat")).await;
        assert_eq!(infos.len(), 1);
        assert!(!infos[0].available);

        let request =
            SearchRequest::new(IndexSelector::new("001"), ComparisonOp::Eq).value("x");
        assert!(matches!(
            service.search(&request).await.unwrap_err(),
            ServiceError::IndexNotFound(_)
        ));
        assert_eq!(service.health().await, (1, 1));
    }

    #[tokio::test]
    async fn test_indexes_are_independent_across_networks() {
        let dir = tempdir().unwrap();
        let service = open(&dir);
        service.create_index(speeding_def()).await.unwrap();
        let mut other = speeding_def();
        other.network = "sepolia".into();
        service.create_index(other).await.unwrap();

        service
            .insert_batch(&InsertBatch::new(
                IndexSelector::new("001").on_network("hardhat"),
                vec![speeding_record("h1", 70)],
            ))
            .await
            .unwrap();

        let search = |network: &str| {
            SearchRequest::new(IndexSelector::new("001").on_network(network), ComparisonOp::GtEq)
                .value("spd::")
        };
        assert_eq!(service.search(&search("hardhat")).await.unwrap().count, 1);
        assert_eq!(service.search(&search("sepolia")).await.unwrap().count, 0);

        // Ambiguous without a network
        let err = service
            .search(&SearchRequest::new(IndexSelector::new("001"), ComparisonOp::Eq).value("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidQuery(_)));
    }
}
