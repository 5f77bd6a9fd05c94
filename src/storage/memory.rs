//! In-process object store.

use super::{DEFAULT_COMPOSE_FAN_IN, ObjectStore, StorageResult};
use crate::error::StorageError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

/// Object store backed by an in-memory ordered map
///
/// Cloning shares the underlying objects. Compose enforces the same fan-in
/// limit a cloud store would, so multi-stage composes are exercised for real.
#[derive(Clone, Debug)]
pub struct MemoryStore {
    objects: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
    fan_in: usize,
    compose_calls: Arc<AtomicUsize>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Empty store with the default fan-in of 32
    pub fn new() -> Self {
        Self::with_fan_in(DEFAULT_COMPOSE_FAN_IN)
    }

    /// Empty store with a custom compose fan-in
    pub fn with_fan_in(fan_in: usize) -> Self {
        Self {
            objects: Arc::new(RwLock::new(BTreeMap::new())),
            fan_in,
            compose_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of compose calls made so far
    pub fn compose_calls(&self) -> usize {
        self.compose_calls.load(Ordering::SeqCst)
    }

    /// Number of stored objects
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    /// Whether the store holds no objects
    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, path: &str, bytes: Vec<u8>) -> StorageResult<()> {
        self.objects.write().await.insert(path.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, path: &str) -> StorageResult<Vec<u8>> {
        self.objects
            .read()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        Ok(self.objects.read().await.contains_key(path))
    }

    async fn compose(&self, sources: &[String], dest: &str) -> StorageResult<()> {
        if sources.len() > self.fan_in {
            return Err(StorageError::FanInExceeded {
                count: sources.len(),
                limit: self.fan_in,
            });
        }
        self.compose_calls.fetch_add(1, Ordering::SeqCst);

        let mut objects = self.objects.write().await;
        let mut combined = Vec::new();
        for source in sources {
            let bytes = objects
                .get(source)
                .ok_or_else(|| StorageError::NotFound(source.clone()))?;
            combined.extend_from_slice(bytes);
        }
        objects.insert(dest.to_string(), combined);
        Ok(())
    }

    async fn list_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
        Ok(self
            .objects
            .read()
            .await
            .range(prefix.to_string()..)
            .take_while(|(name, _)| name.starts_with(prefix))
            .map(|(name, _)| name.clone())
            .collect())
    }

    async fn signed_url(&self, path: &str, ttl: Duration) -> StorageResult<String> {
        if !self.exists(path).await? {
            return Err(StorageError::NotFound(path.to_string()));
        }
        Ok(format!("memory://{}?ttl={}", path, ttl.as_secs()))
    }

    fn max_compose_sources(&self) -> usize {
        self.fan_in
    }

    fn name(&self) -> &str {
        "memory"
    }
}
