use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use ragdb_cache::keys::rerank_key;
use ragdb_cache::{LayeredCache, Namespace};
use ragdb_core::config::RerankerSettings;
use ragdb_core::traits::Reranker;
use ragdb_core::types::Candidate;

use crate::fusion::by_score_desc;

/// Optional cross-encoder pass over fused candidates.
///
/// Never fails: below the size threshold, on timeout, or on any reranker
/// error the fused order is returned unchanged.
pub struct RerankStage {
    reranker: Option<Arc<dyn Reranker>>,
    min_candidates: usize,
    timeout: Duration,
    cache: LayeredCache,
}

impl RerankStage {
    pub fn new(reranker: Option<Arc<dyn Reranker>>, cfg: &RerankerSettings, cache: LayeredCache) -> Self {
        Self { reranker, min_candidates: cfg.min_candidates.max(1), timeout: cfg.timeout(), cache }
    }

    pub fn disabled() -> Self {
        Self { reranker: None, min_candidates: usize::MAX, timeout: Duration::ZERO, cache: LayeredCache::disabled() }
    }

    pub async fn apply(&self, query: &str, candidates: Vec<Candidate>) -> Vec<Candidate> {
        let Some(reranker) = self.reranker.as_ref() else {
            return candidates;
        };
        if candidates.len() < self.min_candidates {
            return candidates;
        }
        let key = rerank_key(query, &candidates, reranker.model());
        if let Some(hit) = self.cache.get_json::<Vec<Candidate>>(Namespace::Rerank, &key).await {
            return hit;
        }
        let documents: Vec<String> = candidates.iter().map(|c| c.content.clone()).collect();
        let scores = match tokio::time::timeout(self.timeout, reranker.rerank(query, &documents)).await {
            Ok(Ok(scores)) if scores.len() == candidates.len() => scores,
            Ok(Ok(scores)) => {
                warn!(expected = candidates.len(), got = scores.len(), "rerank score count mismatch; keeping fused order");
                return candidates;
            }
            Ok(Err(e)) => {
                warn!(error = %e, "rerank failed; keeping fused order");
                return candidates;
            }
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis(), "rerank timed out; keeping fused order");
                return candidates;
            }
        };
        let mut reranked = candidates;
        for (c, s) in reranked.iter_mut().zip(scores) {
            c.score = s;
        }
        reranked.sort_by(by_score_desc);
        debug!(candidates = reranked.len(), model = reranker.model(), "reranked");
        self.cache.put_json(Namespace::Rerank, &key, &reranked).await;
        reranked
    }
}
