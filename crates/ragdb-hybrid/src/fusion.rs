//! Hybrid fusion: vector similarity and lexical rank merged by chunk identity
//! into one weighted score.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use ragdb_core::config::{clamp_alpha, RetrievalSettings};
use ragdb_core::traits::{DocumentStore, Embedder};
use ragdb_core::types::{Candidate, LexicalHit, VectorHit};
use ragdb_core::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionParams {
    pub alpha: f32,
    pub candidate_limit: usize,
}

impl FusionParams {
    pub fn new(alpha: Option<f32>, candidate_limit: usize) -> Self {
        Self { alpha: clamp_alpha(alpha), candidate_limit }
    }
}

impl From<&RetrievalSettings> for FusionParams {
    fn from(cfg: &RetrievalSettings) -> Self {
        Self { alpha: cfg.alpha(), candidate_limit: cfg.candidate_limit() }
    }
}

/// Merges both hit lists. A chunk missing from one list scores 0 there;
/// `score = alpha * vscore + (1 - alpha) * tscore` with `vscore = -distance`.
/// Ties keep a stable order by chunk identity.
pub fn fuse(vector: Vec<VectorHit>, lexical: Vec<LexicalHit>, params: FusionParams) -> Vec<Candidate> {
    let alpha = clamp_alpha(Some(params.alpha));
    let mut merged: HashMap<String, Candidate> = HashMap::new();
    for hit in vector {
        let vscore = -hit.distance;
        merged
            .entry(hit.chunk.key())
            .and_modify(|c| c.vector_score = c.vector_score.max(vscore))
            .or_insert(Candidate {
                chunk: hit.chunk,
                content: hit.content,
                metadata: hit.metadata,
                vector_score: vscore,
                lexical_score: 0.0,
                score: 0.0,
            });
    }
    for hit in lexical {
        merged
            .entry(hit.chunk.key())
            .and_modify(|c| c.lexical_score = c.lexical_score.max(hit.rank))
            .or_insert(Candidate {
                chunk: hit.chunk,
                content: hit.content,
                metadata: hit.metadata,
                vector_score: 0.0,
                lexical_score: hit.rank,
                score: 0.0,
            });
    }
    let mut out: Vec<Candidate> = merged
        .into_values()
        .map(|mut c| {
            c.score = alpha * c.vector_score + (1.0 - alpha) * c.lexical_score;
            c
        })
        .collect();
    out.sort_by(by_score_desc);
    out.truncate(params.candidate_limit);
    out
}

pub(crate) fn by_score_desc(a: &Candidate, b: &Candidate) -> Ordering {
    b.score.total_cmp(&a.score).then_with(|| a.chunk.cmp(&b.chunk))
}

/// Stateless per call; holds only its collaborators.
pub struct FusionEngine {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn DocumentStore>,
}

impl FusionEngine {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn DocumentStore>) -> Self {
        Self { embedder, store }
    }

    /// Embeds `text` and checks the vector against the stored dimension.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let (vector, stored) = tokio::try_join!(self.embed_text(text), self.store.stored_dim())?;
        match stored {
            Some(dim) if dim != vector.len() => Err(Error::Configuration(format!(
                "{} produces {}-dimensional query vectors but the store holds {dim}; re-ingest or realign embedding.dimension",
                self.embedder.name(),
                vector.len()
            ))),
            _ => Ok(vector),
        }
    }

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let mut out = self.embedder.embed(&[text.to_string()]).await?;
        match out.vectors.pop() {
            Some(v) if out.vectors.is_empty() && !v.is_empty() => Ok(v),
            _ => Err(Error::Protocol(format!("{} returned no query embedding", self.embedder.name()))),
        }
    }

    /// Embeds `query`, runs both halves concurrently (first error wins) and fuses.
    pub async fn retrieve(&self, query: &str, params: FusionParams) -> Result<Vec<Candidate>> {
        let vector = self.embed_query(query).await?;
        let limit = params.candidate_limit;
        let (vector_hits, lexical_hits) =
            tokio::try_join!(self.store.vector_search(&vector, limit), self.store.lexical_search(query, limit))?;
        debug!(vector = vector_hits.len(), lexical = lexical_hits.len(), "fusing hit lists");
        Ok(fuse(vector_hits, lexical_hits, params))
    }

    /// Vector half only, used for hypothetical-document retrieval.
    pub async fn retrieve_vector_only(&self, text: &str, params: FusionParams) -> Result<Vec<Candidate>> {
        let vector = self.embed_query(text).await?;
        let hits = self.store.vector_search(&vector, params.candidate_limit).await?;
        Ok(fuse(hits, Vec::new(), params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragdb_core::types::{ChunkRef, Metadata};

    fn vhit(path: &str, similarity: f32) -> VectorHit {
        VectorHit { chunk: ChunkRef::new("r", path, 0), content: path.into(), metadata: Metadata::new(), distance: -similarity }
    }

    fn lhit(path: &str, rank: f32) -> LexicalHit {
        LexicalHit { chunk: ChunkRef::new("r", path, 0), content: path.into(), metadata: Metadata::new(), rank }
    }

    fn order(c: &[Candidate]) -> Vec<&str> {
        c.iter().map(|c| c.chunk.path.as_str()).collect()
    }

    #[test]
    fn weighted_merge_with_missing_component() {
        let out = fuse(vec![vhit("A", 0.9)], vec![lhit("A", 0.3), lhit("B", 0.8)], FusionParams::new(Some(0.5), 50));
        assert_eq!(order(&out), vec!["A", "B"]);
        assert!((out[0].score - 0.6).abs() < 1e-6);
        assert!((out[1].score - 0.4).abs() < 1e-6);
        assert!(out[1].vector_score.abs() < f32::EPSILON);
    }

    #[test]
    fn alpha_extremes_reduce_to_single_ranking() {
        let v = vec![vhit("A", 0.9), vhit("B", 0.5), vhit("C", 0.1)];
        let l = vec![lhit("C", 0.9), lhit("B", 0.6), lhit("A", 0.2)];
        assert_eq!(order(&fuse(v.clone(), l.clone(), FusionParams::new(Some(1.0), 50))), vec!["A", "B", "C"]);
        assert_eq!(order(&fuse(v, l, FusionParams::new(Some(0.0), 50))), vec!["C", "B", "A"]);
    }

    #[test]
    fn invalid_alpha_uses_default_and_limit_truncates() {
        let params = FusionParams::new(Some(3.0), 1);
        assert!((params.alpha - 0.5).abs() < f32::EPSILON);
        let out = fuse(vec![vhit("A", 0.2), vhit("B", 0.4)], Vec::new(), params);
        assert_eq!(order(&out), vec!["B"]);
    }

    #[test]
    fn ties_are_deterministic() {
        let out = fuse(Vec::new(), vec![lhit("b", 0.5), lhit("a", 0.5)], FusionParams::new(None, 10));
        assert_eq!(order(&out), vec!["a", "b"]);
    }
}
