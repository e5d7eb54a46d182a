use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use ragdb_core::traits::Embedder;
use ragdb_core::types::Embeddings;
use ragdb_core::Result;

use super::{ensure_count, DimensionCell};
use crate::http::{build_client, decode, post_json};

/// OpenAI-compatible batch endpoint: one request for all inputs.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
    dim: DimensionCell,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
pub(crate) struct EmbedResponse {
    pub(crate) data: Vec<EmbedData>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
pub(crate) struct EmbedData {
    pub(crate) embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    total_tokens: usize,
}

impl EmbedResponse {
    /// Vectors in input order; providers may return them shuffled with an index.
    pub(crate) fn into_vectors(mut self) -> Vec<Vec<f32>> {
        if self.data.iter().all(|d| d.index.is_some()) {
            self.data.sort_by_key(|d| d.index);
        }
        self.data.into_iter().map(|d| d.embedding).collect()
    }
}

impl OpenAiEmbedder {
    pub fn new(url: String, api_key: Option<String>, model: String, dimension: Option<usize>, timeout: Duration) -> Result<Self> {
        Ok(Self { client: build_client(timeout)?, url, api_key, model, dim: DimensionCell::new(dimension) })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn name(&self) -> &str {
        "openai"
    }

    fn dim(&self) -> Option<usize> {
        self.dim.get()
    }

    async fn embed(&self, texts: &[String]) -> Result<Embeddings> {
        if texts.is_empty() {
            return Ok(Embeddings::default());
        }
        let body = EmbedRequest { model: &self.model, input: texts };
        let bytes = post_json(&self.client, &self.url, self.api_key.as_deref(), &body).await?;
        let resp: EmbedResponse = decode(&bytes, "embedding")?;
        let tokens_used = resp.usage.as_ref().map_or(0, |u| u.total_tokens);
        let vectors = resp.into_vectors();
        ensure_count(vectors.len(), texts.len(), self.name())?;
        self.dim.observe(&vectors);
        Ok(Embeddings { vectors, tokens_used })
    }
}
