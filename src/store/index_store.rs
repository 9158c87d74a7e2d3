//! Index Store - one persistent ordered index
//!
//! Combines the append-only [`IndexFile`] with the in-memory
//! [`OrderedTree`]:
//!
//! ```text
//! Write path (single writer, serialized by the file mutex):
//!   IndexWriter::insert → tree read (dup check) → tree write { file append → tree insert }
//!
//! Read path (any number of readers):
//!   search → tree read → ordered txIds
//! ```
//!
//! The tree write lock is held for exactly one record, so readers running
//! during a batch see every record either completely or not at all.

use crate::store::error::{StoreError, StoreResult};
use crate::store::file::{IndexFile, SyncMode};
use crate::store::tree::OrderedTree;
use crate::store::types::{IndexRecord, InsertOutcome, KeyQuery, StoreStats};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tokio::sync::{Mutex, MutexGuard, RwLock};

pub struct IndexStore {
    path: PathBuf,
    key_size: u32,
    tree: RwLock<OrderedTree>,
    file: Mutex<IndexFile>,
    /// Set on the first write failure; the index stays unavailable afterwards
    failure: OnceLock<String>,
}

impl IndexStore {
    /// Create a fresh index file at `path`
    pub fn create(path: impl AsRef<Path>, key_size: u32, sync_mode: SyncMode) -> StoreResult<Self> {
        let file = IndexFile::create(path.as_ref(), key_size, sync_mode)?;
        tracing::debug!(path = ?path.as_ref(), key_size, "Created index file");

        Ok(Self {
            path: path.as_ref().to_path_buf(),
            key_size,
            tree: RwLock::new(OrderedTree::new()),
            file: Mutex::new(file),
            failure: OnceLock::new(),
        })
    }

    /// Open an existing index file, checking its key size against the definition
    pub fn open(path: impl AsRef<Path>, key_size: u32, sync_mode: SyncMode) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let (file, records) = IndexFile::open(&path, sync_mode)?;

        if file.key_size() != key_size {
            return Err(StoreError::corruption(
                &path,
                format!(
                    "file key size {} does not match definition key size {}",
                    file.key_size(),
                    key_size
                ),
            ));
        }

        let mut tree = OrderedTree::new();
        for record in &records {
            tree.insert(&record.key, &record.tx_id);
        }

        tracing::info!(
            path = ?path,
            keys = tree.key_count(),
            entries = tree.entry_count(),
            "Opened index file"
        );

        Ok(Self {
            path,
            key_size,
            tree: RwLock::new(tree),
            file: Mutex::new(file),
            failure: OnceLock::new(),
        })
    }

    /// Open if the file exists, otherwise create it
    pub fn open_or_create(
        path: impl AsRef<Path>,
        key_size: u32,
        sync_mode: SyncMode,
    ) -> StoreResult<Self> {
        if path.as_ref().exists() {
            Self::open(path, key_size, sync_mode)
        } else {
            Self::create(path, key_size, sync_mode)
        }
    }

    /// Acquire the single writer for this index
    pub async fn writer(&self) -> StoreResult<IndexWriter<'_>> {
        self.check_available()?;
        let file = self.file.lock().await;
        Ok(IndexWriter { store: self, file })
    }

    /// Insert a single pair and commit it
    pub async fn insert(&self, key: &str, tx_id: &str) -> StoreResult<InsertOutcome> {
        let mut writer = self.writer().await?;
        let outcome = writer.insert(key, tx_id).await?;
        writer.commit()?;
        Ok(outcome)
    }

    /// Evaluate a predicate against the index
    pub async fn search(&self, query: &KeyQuery) -> StoreResult<Vec<String>> {
        self.search_limited(query, None).await
    }

    pub async fn search_limited(
        &self,
        query: &KeyQuery,
        limit: Option<usize>,
    ) -> StoreResult<Vec<String>> {
        self.check_available()?;
        let tree = self.tree.read().await;
        Ok(tree.search_limited(query, limit))
    }

    /// Current counters
    pub async fn stats(&self) -> StoreStats {
        let tree = self.tree.read().await;
        StoreStats {
            key_count: tree.key_count(),
            entry_count: tree.entry_count(),
            file_size_bytes: std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0),
        }
    }

    /// Smallest and largest key currently stored
    pub async fn key_bounds(&self) -> Option<(String, String)> {
        let tree = self.tree.read().await;
        tree.key_bounds().map(|(a, b)| (a.to_string(), b.to_string()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn key_size(&self) -> u32 {
        self.key_size
    }

    /// Reason the index was marked failed, if it was
    pub fn failure(&self) -> Option<&str> {
        self.failure.get().map(|s| s.as_str())
    }

    fn check_available(&self) -> StoreResult<()> {
        match self.failure.get() {
            Some(reason) => Err(StoreError::Unavailable {
                path: self.path.clone(),
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    fn mark_failed(&self, err: &StoreError) {
        if self.failure.set(err.to_string()).is_ok() {
            tracing::error!(path = ?self.path, error = %err, "Index marked unavailable");
        }
    }
}

/// Exclusive write access to one index
///
/// Holding a writer serializes inserts; searches continue between records.
pub struct IndexWriter<'a> {
    store: &'a IndexStore,
    file: MutexGuard<'a, IndexFile>,
}

impl IndexWriter<'_> {
    /// Insert one pair. Duplicates are detected and not written.
    pub async fn insert(&mut self, key: &str, tx_id: &str) -> StoreResult<InsertOutcome> {
        self.store.check_available()?;

        let max = self.store.key_size as usize;
        if max > 0 && key.len() > max {
            return Err(StoreError::KeyTooLarge {
                len: key.len(),
                max,
            });
        }

        if self.store.tree.read().await.contains(key, tx_id) {
            return Ok(InsertOutcome::Duplicate);
        }

        let record = IndexRecord::new(key, tx_id);
        let mut tree = self.store.tree.write().await;
        if let Err(e) = self.file.append(&record) {
            self.store.mark_failed(&e);
            return Err(e);
        }
        Ok(tree.insert(key, tx_id))
    }

    /// Make the records written so far durable
    pub fn commit(&mut self) -> StoreResult<()> {
        if let Err(e) = self.file.commit() {
            self.store.mark_failed(&e);
            return Err(e);
        }
        Ok(())
    }

    /// Records in the backing file
    pub fn record_count(&self) -> u64 {
        self.file.record_count()
    }
}
