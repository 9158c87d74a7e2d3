//! Caller-owned index id cache
//!
//! Callers address indexes by `(indexingKey, network)` and need the
//! server's `indexId`. The cache resolves each pair once through an
//! [`IndexDirectory`] and keeps the answer until the caller invalidates it.

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use tokio::sync::RwLock;

use super::error::ClientError;

/// Resolves an indexing key on a network to an index id
#[async_trait]
pub trait IndexDirectory: Send + Sync {
    async fn resolve_index_id(
        &self,
        indexing_key: &str,
        network: &str,
    ) -> Result<String, ClientError>;
}

type CacheKey = (String, String);

/// Index id lookups keyed by `(indexingKey, network)`
pub struct IndexIdCache<D> {
    directory: D,
    entries: RwLock<HashMap<CacheKey, String>>,
}

impl<D: IndexDirectory> IndexIdCache<D> {
    pub fn new(directory: D) -> Self {
        Self {
            directory,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    /// Cached id, or resolve and remember it
    pub async fn get_or_resolve(
        &self,
        indexing_key: &str,
        network: &str,
    ) -> Result<String, ClientError> {
        let key = (indexing_key.to_string(), network.to_string());
        if let Some(id) = self.entries.read().await.get(&key) {
            return Ok(id.clone());
        }

        let id = self
            .directory
            .resolve_index_id(indexing_key, network)
            .await?;
        tracing::debug!(
            indexing_key = %indexing_key,
            network = %network,
            index_id = %id,
            "Resolved index id"
        );

        self.entries.write().await.insert(key, id.clone());
        Ok(id)
    }

    /// Drop one cached id; returns whether it was present
    pub async fn invalidate(&self, indexing_key: &str, network: &str) -> bool {
        let key = (indexing_key.to_string(), network.to_string());
        self.entries.write().await.remove(&key).is_some()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Run `search` with the cached id
    ///
    /// When the server answers `IndexNotFound`, the entry is invalidated,
    /// re-resolved and the search retried once.
    pub async fn search_with_cache<F, Fut, T>(
        &self,
        indexing_key: &str,
        network: &str,
        search: F,
    ) -> Result<T, ClientError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let id = self.get_or_resolve(indexing_key, network).await?;

        match search(id.clone()).await {
            Err(e) if e.is_index_not_found() => {
                tracing::info!(
                    indexing_key = %indexing_key,
                    network = %network,
                    stale_id = %id,
                    "Cached index id rejected, re-resolving"
                );
                self.invalidate(indexing_key, network).await;
                let id = self.get_or_resolve(indexing_key, network).await?;
                search(id).await
            }
            other => other,
        }
    }
}
