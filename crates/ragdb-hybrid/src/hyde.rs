//! Low-recall fallback: when fusion finds too few candidates, race the
//! direct path against retrieval on a hypothetical answer.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use ragdb_core::traits::Generator;
use ragdb_core::types::Candidate;
use ragdb_core::{Error, Result};

use crate::fusion::{FusionEngine, FusionParams};
use crate::rerank::RerankStage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    Direct,
    Hyde,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub candidates: Vec<Candidate>,
    pub branch: Branch,
}

pub fn hypothesis_prompt(question: &str) -> String {
    format!(
        "Write a short passage from internal documentation that answers the question below. \
         Do not mention that it is hypothetical.\nQuestion: {question}\nPassage:"
    )
}

#[derive(Clone)]
pub struct HydeController {
    fusion: Arc<FusionEngine>,
    rerank: Arc<RerankStage>,
    generator: Option<Arc<dyn Generator>>,
    params: FusionParams,
    min_hits: usize,
    race: bool,
}

impl HydeController {
    pub fn new(
        fusion: Arc<FusionEngine>,
        rerank: Arc<RerankStage>,
        generator: Option<Arc<dyn Generator>>,
        params: FusionParams,
        min_hits: usize,
    ) -> Self {
        Self { fusion, rerank, generator, params, min_hits: min_hits.max(1), race: true }
    }

    /// With racing off, low-recall queries take the direct branch only.
    pub fn with_race(mut self, race: bool) -> Self {
        self.race = race;
        self
    }

    pub fn can_rewrite(&self) -> bool {
        self.generator.is_some()
    }

    /// Rerank the fused candidates and keep the top `limit`.
    pub async fn direct(&self, question: &str, candidates: Vec<Candidate>, limit: usize) -> Vec<Candidate> {
        let mut out = self.rerank.apply(question, candidates).await;
        out.truncate(limit);
        out
    }

    /// Generate a hypothetical answer, retrieve on its embedding (vector half
    /// only), then rerank against the original question.
    pub async fn hyde(&self, question: &str, limit: usize) -> Result<Vec<Candidate>> {
        let generator = self
            .generator
            .as_ref()
            .ok_or_else(|| Error::ConfigurationMissing("generator.endpoint".into()))?;
        let hypothesis = generator.complete(&hypothesis_prompt(question)).await?;
        if hypothesis.trim().is_empty() {
            return Err(Error::Protocol("empty hypothesis".into()));
        }
        let candidates = self.fusion.retrieve_vector_only(&hypothesis, self.params).await?;
        Ok(self.direct(question, candidates, limit).await)
    }

    /// Direct branch only when recall is adequate; otherwise the first branch
    /// to finish successfully wins and the other is cancelled.
    pub async fn resolve(&self, question: &str, candidates: Vec<Candidate>, limit: usize) -> Result<Resolved> {
        if candidates.len() >= self.min_hits || !self.race || self.generator.is_none() {
            let candidates = self.direct(question, candidates, limit).await;
            return Ok(Resolved { candidates, branch: Branch::Direct });
        }
        debug!(found = candidates.len(), min_hits = self.min_hits, "low recall; racing hypothetical retrieval");

        let cancel = CancellationToken::new();
        // Dropping the caller's future cancels both branches.
        let _guard = cancel.clone().drop_guard();
        let (tx, mut rx) = mpsc::channel::<(Branch, Result<Vec<Candidate>>)>(2);

        {
            let this = self.clone();
            let question = question.to_string();
            let cancel = cancel.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                tokio::select! {
                    () = cancel.cancelled() => {}
                    out = this.direct(&question, candidates, limit) => {
                        let _ = tx.send((Branch::Direct, Ok(out))).await;
                    }
                }
            });
        }
        {
            let this = self.clone();
            let question = question.to_string();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    () = cancel.cancelled() => {}
                    out = this.hyde(&question, limit) => {
                        let _ = tx.send((Branch::Hyde, out)).await;
                    }
                }
            });
        }

        let mut last_err = None;
        while let Some((branch, out)) = rx.recv().await {
            match out {
                Ok(candidates) => {
                    cancel.cancel();
                    debug!(?branch, results = candidates.len(), "race settled");
                    return Ok(Resolved { candidates, branch });
                }
                Err(e) => {
                    warn!(?branch, error = %e, "fallback branch failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| Error::Store("retrieval race produced no result".into())))
    }
}
