//! Capability seams between the retrieval pipeline and its collaborators.
//!
//! Every method is a suspension point; dropping the returned future cancels
//! the in-flight call.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;
use crate::types::{DocumentChunk, Embeddings, LexicalHit, VectorHit};

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Provider label used in logs and cache keys.
    fn name(&self) -> &str;
    /// Configured dimension, or the one observed on the first successful call.
    fn dim(&self) -> Option<usize>;
    async fn embed(&self, texts: &[String]) -> Result<Embeddings>;
}

#[async_trait]
pub trait Reranker: Send + Sync {
    fn model(&self) -> &str;
    /// Returns one score per document, in input order.
    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<f32>>;
}

#[async_trait]
pub trait Generator: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn ensure_schema(&self, dim: usize, allow_migrate: bool) -> Result<()>;
    /// Returns the number of rows actually rewritten.
    async fn upsert_documents(&self, rows: &[DocumentChunk]) -> Result<usize>;
    async fn vector_search(&self, query: &[f32], limit: usize) -> Result<Vec<VectorHit>>;
    async fn lexical_search(&self, query: &str, limit: usize) -> Result<Vec<LexicalHit>>;
    /// Dimension of the vectors currently stored; `None` before the first schema.
    async fn stored_dim(&self) -> Result<Option<usize>> {
        Ok(None)
    }
}

/// Key/value store with expiring entries and a conditional set.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;
    /// Sets the key only when absent. Returns whether this call wrote it.
    async fn set_nx(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool>;
    async fn delete(&self, key: &str) -> Result<()>;

    /// Deletes the key only while it still holds `expected`. Returns whether
    /// it was removed. Stores with a server-side primitive should override.
    async fn delete_if_eq(&self, key: &str, expected: &[u8]) -> Result<bool> {
        match self.get(key).await? {
            Some(current) if current == expected => {
                self.delete(key).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
