use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use ragdb_core::{Error, Result};

use crate::matrix::PermissionMatrix;
use crate::store::MatrixStore;

/// Cached, version-checked access to the permission matrix.
///
/// Readers share a cached copy; writers are serialised and must submit the
/// version they read. A successful write replaces the cached copy.
pub struct PermissionMatrixService {
    store: Option<Arc<dyn MatrixStore>>,
    cached: RwLock<Option<PermissionMatrix>>,
    writer: Mutex<()>,
}

impl PermissionMatrixService {
    pub fn new(store: Arc<dyn MatrixStore>) -> Self {
        Self { store: Some(store), cached: RwLock::new(None), writer: Mutex::new(()) }
    }

    /// No backing store; every call fails with `ConfigurationMissing`.
    pub fn unconfigured() -> Self {
        Self { store: None, cached: RwLock::new(None), writer: Mutex::new(()) }
    }

    fn store(&self) -> Result<&Arc<dyn MatrixStore>> {
        self.store.as_ref().ok_or_else(|| Error::ConfigurationMissing("store.uri".into()))
    }

    pub async fn get(&self) -> Result<PermissionMatrix> {
        if let Some(m) = self.cached.read().await.as_ref() {
            return Ok(m.clone());
        }
        let store = self.store()?;
        let mut cached = self.cached.write().await;
        if let Some(m) = cached.as_ref() {
            return Ok(m.clone());
        }
        let loaded = store.load().await?.unwrap_or_default();
        *cached = Some(loaded.clone());
        Ok(loaded)
    }

    /// Persists `matrix` if its version matches the stored one and returns
    /// the stored result with the version incremented by one.
    pub async fn update(&self, matrix: PermissionMatrix) -> Result<PermissionMatrix> {
        let store = self.store()?;
        let normalized = matrix.normalize()?;
        let _writer = self.writer.lock().await;
        let current = store.load().await?.unwrap_or_default();
        if current.version != normalized.version {
            return Err(Error::Conflict(format!(
                "permission matrix version {} is stale; current is {}",
                normalized.version, current.version
            )));
        }
        let updated = PermissionMatrix { version: current.version + 1, modules: normalized.modules };
        store.save(&updated).await?;
        *self.cached.write().await = Some(updated.clone());
        info!(version = updated.version, modules = updated.modules.len(), "permission matrix updated");
        Ok(updated)
    }

    /// Drops the cached copy so the next read goes to the store.
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }
}
