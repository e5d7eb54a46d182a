use async_trait::async_trait;
use lancedb::Connection;
use tokio::sync::Mutex;

use ragdb_core::{Error, Result};
use ragdb_vector::{get_meta, open_db, set_meta, META_TABLE};

use crate::matrix::PermissionMatrix;

const MATRIX_KEY: &str = "admin:permission_matrix";

/// Durable home of the permission matrix.
#[async_trait]
pub trait MatrixStore: Send + Sync {
    async fn load(&self) -> Result<Option<PermissionMatrix>>;
    async fn save(&self, matrix: &PermissionMatrix) -> Result<()>;
}

/// Stores the matrix as one JSON document in the LanceDB meta table.
pub struct LanceMatrixStore {
    conn: Connection,
}

impl LanceMatrixStore {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    pub async fn open(uri: &str) -> Result<Self> {
        Ok(Self::new(open_db(uri).await?))
    }
}

#[async_trait]
impl MatrixStore for LanceMatrixStore {
    async fn load(&self) -> Result<Option<PermissionMatrix>> {
        match get_meta(&self.conn, META_TABLE, MATRIX_KEY).await? {
            Some(raw) => serde_json::from_str(&raw).map(Some).map_err(Error::store),
            None => Ok(None),
        }
    }

    async fn save(&self, matrix: &PermissionMatrix) -> Result<()> {
        let raw = serde_json::to_string(matrix).map_err(Error::store)?;
        set_meta(&self.conn, META_TABLE, MATRIX_KEY, &raw).await
    }
}

#[derive(Default)]
pub struct MemoryMatrixStore {
    inner: Mutex<Option<PermissionMatrix>>,
}

#[async_trait]
impl MatrixStore for MemoryMatrixStore {
    async fn load(&self) -> Result<Option<PermissionMatrix>> {
        Ok(self.inner.lock().await.clone())
    }

    async fn save(&self, matrix: &PermissionMatrix) -> Result<()> {
        *self.inner.lock().await = Some(matrix.clone());
        Ok(())
    }
}
