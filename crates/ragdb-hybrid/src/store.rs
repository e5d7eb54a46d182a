use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use ragdb_core::config::StoreSettings;
use ragdb_core::traits::DocumentStore;
use ragdb_core::types::{DocumentChunk, LexicalHit, VectorHit};
use ragdb_core::{Error, Result};
use ragdb_text::LexicalIndex;
use ragdb_vector::{SchemaChange, VectorStore};

/// The persisted store: a LanceDB chunk table plus a Tantivy index derived
/// from the same rows. The vector half commits first; the lexical half is then
/// brought in line with every row of the batch, so a retry after a failed
/// lexical write repairs it even though the vector rows are unchanged.
pub struct HybridStore {
    vector: VectorStore,
    lexical: Arc<LexicalIndex>,
}

impl HybridStore {
    pub fn new(vector: VectorStore, lexical: LexicalIndex) -> Self {
        Self { vector, lexical: Arc::new(lexical) }
    }

    pub async fn open(cfg: &StoreSettings) -> Result<Self> {
        if !cfg.is_configured() {
            return Err(Error::ConfigurationMissing("store.uri".into()));
        }
        let uri = cfg.uri_path();
        let vector = VectorStore::open(&uri.to_string_lossy(), &cfg.table, cfg.ann_min_rows).await?;
        let text_dir = cfg.text_index_path();
        let lexical = tokio::task::spawn_blocking(move || LexicalIndex::open_or_create(&text_dir))
            .await
            .map_err(Error::store)??;
        info!(uri = %uri.display(), table = %vector.active_table(), "opened document store");
        Ok(Self::new(vector, lexical))
    }

    pub fn vector(&self) -> &VectorStore {
        &self.vector
    }

    pub fn lexical(&self) -> &LexicalIndex {
        &self.lexical
    }

    async fn with_lexical<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&LexicalIndex) -> Result<T> + Send + 'static,
    {
        let lexical = self.lexical.clone();
        tokio::task::spawn_blocking(move || op(&lexical)).await.map_err(Error::store)?
    }
}

#[async_trait]
impl DocumentStore for HybridStore {
    async fn ensure_schema(&self, dim: usize, allow_migrate: bool) -> Result<()> {
        match self.vector.ensure_schema(dim, allow_migrate).await? {
            SchemaChange::Unchanged => Ok(()),
            change => {
                // A fresh chunk table has no rows; drop any lexical documents left behind.
                debug!(?change, "resetting lexical index");
                self.with_lexical(LexicalIndex::clear).await
            }
        }
    }

    async fn upsert_documents(&self, rows: &[DocumentChunk]) -> Result<usize> {
        let affected = self.vector.upsert(rows).await?.len();
        let batch = rows.to_vec();
        let reindexed = self
            .with_lexical(move |lexical| {
                let stale = lexical.stale(&batch)?;
                lexical.upsert(&stale)?;
                Ok(stale.len())
            })
            .await?;
        if reindexed > affected {
            warn!(reindexed, affected, "lexical index was behind the chunk table; repaired");
        }
        debug!(incoming = rows.len(), affected, reindexed, "upsert complete");
        Ok(affected)
    }

    async fn vector_search(&self, query: &[f32], limit: usize) -> Result<Vec<VectorHit>> {
        self.vector.search(query, limit).await
    }

    async fn lexical_search(&self, query: &str, limit: usize) -> Result<Vec<LexicalHit>> {
        let query = query.to_string();
        self.with_lexical(move |lexical| lexical.search(&query, limit)).await
    }

    async fn stored_dim(&self) -> Result<Option<usize>> {
        self.vector.stored_dim().await
    }
}
