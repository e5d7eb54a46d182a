//! Answer-serving orchestration: caches, coalescing, fusion, the low-recall
//! race, confidence escalation and answer generation.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use ragdb_cache::keys::{answer_key, retrieval_key};
use ragdb_cache::{Coalescer, DistributedLock, LayeredCache, Namespace};
use ragdb_core::config::{RetrievalSettings, Settings};
use ragdb_core::traits::{DocumentStore, Embedder, Generator, Reranker};
use ragdb_core::types::{Candidate, DocumentChunk, RetrievedChunk};
use ragdb_core::{Error, Result};
use ragdb_embed::{build_embedder, build_generator, build_reranker};

use crate::fusion::{FusionEngine, FusionParams};
use crate::hyde::{Branch, HydeController};
use crate::rerank::RerankStage;
use crate::store::HybridStore;

/// Below this top score, retry retrieval on a hypothetical answer.
pub const REWRITE_THRESHOLD: f32 = 0.5;
/// Below this top score after the retry, answer from general knowledge.
pub const GENERAL_KNOWLEDGE_THRESHOLD: f32 = 0.6;

pub const GENERAL_KNOWLEDGE_LABEL: &str = "[No internal source found; this answer is based on general knowledge.]";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    #[serde(default)]
    pub history: Option<serde_json::Value>,
    #[serde(default)]
    pub limit: Option<usize>,
    /// Opt-in confidence escalation.
    #[serde(default)]
    pub fallback: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub chunks: Option<Vec<RetrievedChunk>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_scores: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// Store or embedder not configured.
    Unconfigured,
    Answered(QueryResponse),
}

impl QueryOutcome {
    pub fn into_response(self) -> QueryResponse {
        match self {
            Self::Unconfigured => QueryResponse::default(),
            Self::Answered(r) => r,
        }
    }
}

/// Collaborators wired into a [`RagService`]; any may be absent.
#[derive(Default)]
pub struct Components {
    pub store: Option<Arc<dyn DocumentStore>>,
    pub embedder: Option<Arc<dyn Embedder>>,
    pub reranker: Option<Arc<dyn Reranker>>,
    pub generator: Option<Arc<dyn Generator>>,
    pub cache: Option<LayeredCache>,
    pub lock: Option<DistributedLock>,
}

struct Pipeline {
    retrieval: RetrievalSettings,
    fusion: Arc<FusionEngine>,
    hyde: HydeController,
    generator: Option<Arc<dyn Generator>>,
    cache: LayeredCache,
}

pub struct RagService {
    store: Option<Arc<dyn DocumentStore>>,
    embedder: Option<Arc<dyn Embedder>>,
    allow_migrate: bool,
    retrieval: RetrievalSettings,
    pipeline: Option<Arc<Pipeline>>,
    answers: Coalescer<QueryResponse>,
}

impl RagService {
    pub fn new(settings: &Settings, parts: Components) -> Self {
        let cache = parts.cache.unwrap_or_else(LayeredCache::disabled);
        let retrieval = settings.retrieval.clone();
        let pipeline = match (&parts.store, &parts.embedder) {
            (Some(store), Some(embedder)) => {
                let fusion = Arc::new(FusionEngine::new(embedder.clone(), store.clone()));
                let rerank = Arc::new(RerankStage::new(parts.reranker, &settings.reranker, cache.clone()));
                let hyde = HydeController::new(
                    fusion.clone(),
                    rerank,
                    parts.generator.clone(),
                    FusionParams::from(&retrieval),
                    retrieval.min_hits(),
                )
                .with_race(retrieval.hyde);
                Some(Arc::new(Pipeline {
                    retrieval: retrieval.clone(),
                    fusion,
                    hyde,
                    generator: parts.generator,
                    cache: cache.clone(),
                }))
            }
            _ => None,
        };
        Self {
            store: parts.store,
            embedder: parts.embedder,
            allow_migrate: settings.store.allow_migrate,
            retrieval,
            pipeline,
            answers: Coalescer::new(cache, parts.lock, Namespace::Answer),
        }
    }

    /// Builds every configured collaborator. Unconfigured store or embedding
    /// sections leave the service in its no-op mode.
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        let embedder = match build_embedder(&settings.embedding) {
            Ok(e) => Some(e),
            Err(Error::ConfigurationMissing(what)) => {
                info!(missing = %what, "embedding not configured; retrieval disabled");
                None
            }
            Err(e) => return Err(e),
        };
        let store: Option<Arc<dyn DocumentStore>> = if settings.store.is_configured() {
            Some(Arc::new(HybridStore::open(&settings.store).await?))
        } else {
            info!("store not configured; upsert and query are no-ops");
            None
        };
        let (cache, lock) = ragdb_cache::from_settings(&settings.cache)?;
        let parts = Components {
            store,
            embedder,
            reranker: build_reranker(&settings.reranker)?,
            generator: build_generator(&settings.generator)?,
            cache: Some(cache),
            lock,
        };
        Ok(Self::new(settings, parts))
    }

    pub fn is_configured(&self) -> bool {
        self.pipeline.is_some()
    }

    /// Writes pre-embedded chunks. Chunks without a vector are embedded first
    /// when an embedder is available. Returns the number of rewritten rows.
    pub async fn upsert(&self, mut docs: Vec<DocumentChunk>) -> Result<usize> {
        let Some(store) = self.store.as_ref() else {
            return Ok(0);
        };
        if docs.is_empty() {
            return Ok(0);
        }
        self.fill_missing_embeddings(&mut docs).await?;
        let dim = docs[0].embedding.len();
        if dim == 0 {
            return Err(Error::InvalidInput("documents carry no embedding and no embedder is configured".into()));
        }
        // Rows must share the dimension of the embedder that embeds queries.
        if let Some(embedder) = self.embedder.as_ref() {
            if let Some(expected) = embedder.dim().filter(|&d| d != dim) {
                return Err(Error::Configuration(format!(
                    "documents carry {dim}-dimensional embeddings but {} produces {expected}",
                    embedder.name()
                )));
            }
        }
        store.ensure_schema(dim, self.allow_migrate).await?;
        let rows = store.upsert_documents(&docs).await?;
        info!(received = docs.len(), rows, "upserted documents");
        Ok(rows)
    }

    async fn fill_missing_embeddings(&self, docs: &mut [DocumentChunk]) -> Result<()> {
        let missing: Vec<usize> = docs.iter().enumerate().filter(|(_, d)| d.embedding.is_empty()).map(|(i, _)| i).collect();
        if missing.is_empty() {
            return Ok(());
        }
        let Some(embedder) = self.embedder.as_ref() else {
            return Ok(());
        };
        let texts: Vec<String> = missing.iter().map(|&i| docs[i].content.clone()).collect();
        let out = embedder.embed(&texts).await?;
        if out.vectors.len() != missing.len() {
            return Err(Error::Protocol(format!("{} returned {} vectors for {} texts", embedder.name(), out.vectors.len(), missing.len())));
        }
        for (i, v) in missing.into_iter().zip(out.vectors) {
            docs[i].embedding = v;
        }
        debug!(tokens = out.tokens_used, "embedded documents without vectors");
        Ok(())
    }

    pub async fn query(&self, req: QueryRequest) -> Result<QueryOutcome> {
        let question = req.question.trim().to_string();
        if question.is_empty() {
            return Err(Error::InvalidInput("question is required".into()));
        }
        let Some(pipeline) = self.pipeline.clone() else {
            return Ok(QueryOutcome::Unconfigured);
        };
        let limit = req.limit.filter(|&n| n > 0).unwrap_or(self.retrieval.result_limit.max(1));
        let history = req.history.as_ref().map(serde_json::Value::to_string).unwrap_or_default();
        let version = format!("{}:n{limit}", self.retrieval.pipeline_version);
        let key = answer_key(&question, &history, &version, req.fallback);
        let fallback = req.fallback;
        let response = self
            .answers
            .get_or_compute(&key, move || async move { pipeline.answer(&question, limit, fallback).await })
            .await?;
        Ok(QueryOutcome::Answered(response))
    }
}

impl Pipeline {
    async fn answer(&self, question: &str, limit: usize, fallback: bool) -> Result<QueryResponse> {
        let candidates = self.candidates(question).await?;
        let resolved = self.hyde.resolve(question, candidates, limit).await?;
        let mut chunks = resolved.candidates;

        // Escalation starts below the rewrite threshold only; the general
        // knowledge gate applies to whatever the rewrite left behind.
        if fallback && top_score(&chunks) < REWRITE_THRESHOLD {
            if self.hyde.can_rewrite() && resolved.branch != Branch::Hyde {
                match self.hyde.hyde(question, limit).await {
                    Ok(rewritten) if top_score(&rewritten) > top_score(&chunks) => chunks = rewritten,
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "rewritten retrieval failed"),
                }
            }
            if top_score(&chunks) < GENERAL_KNOWLEDGE_THRESHOLD {
                if let Some(generator) = self.generator.as_ref() {
                    info!(confidence = top_score(&chunks), "no confident internal source; answering from general knowledge");
                    let text = generator.complete(&general_prompt(question)).await?;
                    return Ok(QueryResponse {
                        chunks: Some(Vec::new()),
                        confidence: Some(0.0),
                        top_scores: Some(Vec::new()),
                        answer: Some(format!("{GENERAL_KNOWLEDGE_LABEL}\n{text}")),
                    });
                }
            }
        }

        let answer = match self.generator.as_ref() {
            Some(generator) if !chunks.is_empty() => Some(generator.complete(&answer_prompt(&chunks, question)).await?),
            _ => None,
        };
        let confidence = chunks.first().map(|c| c.score);
        let top_scores = chunks.iter().map(|c| c.score).collect();
        Ok(QueryResponse {
            chunks: Some(chunks.iter().map(RetrievedChunk::from).collect()),
            confidence,
            top_scores: Some(top_scores),
            answer,
        })
    }

    /// Fusion behind the retrieval-candidate cache.
    async fn candidates(&self, question: &str) -> Result<Vec<Candidate>> {
        let params = FusionParams::from(&self.retrieval);
        let key = retrieval_key(question, params.alpha, params.candidate_limit);
        if let Some(hit) = self.cache.get_json::<Vec<Candidate>>(Namespace::Retrieval, &key).await {
            return Ok(hit);
        }
        let fused = self.fusion.retrieve(question, params).await?;
        self.cache.put_json(Namespace::Retrieval, &key, &fused).await;
        Ok(fused)
    }
}

/// Highest score in the list, or negative infinity when empty.
fn top_score(chunks: &[Candidate]) -> f32 {
    chunks.iter().map(|c| c.score).fold(f32::NEG_INFINITY, f32::max)
}

pub fn answer_prompt(chunks: &[Candidate], question: &str) -> String {
    let context = chunks.iter().map(|c| c.content.as_str()).collect::<Vec<_>>().join("\n---\n");
    format!("{context}\n\nQuestion: {question}\nAnswer:")
}

pub fn general_prompt(question: &str) -> String {
    format!("No internal documentation matched this question. Answer it from general knowledge.\n\nQuestion: {question}\nAnswer:")
}
