//! Embedding backends. Each one implements [`ragdb_core::traits::Embedder`];
//! the factory picks exactly one at construction time.

mod bge;
mod chutes;
mod hash;
mod ollama;
mod openai;

pub use bge::BgeEmbedder;
pub use chutes::ChutesEmbedder;
pub use hash::HashEmbedder;
pub use ollama::OllamaEmbedder;
pub use openai::OpenAiEmbedder;

use std::sync::atomic::{AtomicUsize, Ordering};

use ragdb_core::{Error, Result};

/// Embedding dimension: fixed by configuration or learned from the first
/// successful response.
#[derive(Debug, Default)]
pub(crate) struct DimensionCell(AtomicUsize);

impl DimensionCell {
    pub(crate) fn new(configured: Option<usize>) -> Self {
        Self(AtomicUsize::new(configured.unwrap_or(0)))
    }

    pub(crate) fn get(&self) -> Option<usize> {
        match self.0.load(Ordering::Acquire) {
            0 => None,
            d => Some(d),
        }
    }

    pub(crate) fn observe(&self, vectors: &[Vec<f32>]) {
        if let Some(first) = vectors.first().filter(|v| !v.is_empty()) {
            let _ = self.0.compare_exchange(0, first.len(), Ordering::AcqRel, Ordering::Acquire);
        }
    }
}

pub(crate) fn ensure_count(got: usize, want: usize, provider: &str) -> Result<()> {
    if got == want {
        Ok(())
    } else {
        Err(Error::Protocol(format!("{provider} returned {got} embeddings for {want} inputs")))
    }
}
