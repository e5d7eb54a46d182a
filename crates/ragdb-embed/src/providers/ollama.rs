use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use ragdb_core::traits::Embedder;
use ragdb_core::types::Embeddings;
use ragdb_core::Result;

use super::DimensionCell;
use crate::http::{build_client, decode, post_json};

/// Local Ollama server; one request per input text.
pub struct OllamaEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    dim: DimensionCell,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f64>,
}

impl OllamaEmbedder {
    pub fn new(url: String, model: String, dimension: Option<usize>, timeout: Duration) -> Result<Self> {
        Ok(Self { client: build_client(timeout)?, url, model, dim: DimensionCell::new(dimension) })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn name(&self) -> &str {
        "ollama"
    }

    fn dim(&self) -> Option<usize> {
        self.dim.get()
    }

    async fn embed(&self, texts: &[String]) -> Result<Embeddings> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            let body = EmbedRequest { model: &self.model, prompt: text };
            let bytes = post_json(&self.client, &self.url, None, &body).await?;
            let resp: EmbedResponse = decode(&bytes, "ollama embedding")?;
            vectors.push(resp.embedding.into_iter().map(|x| x as f32).collect());
        }
        self.dim.observe(&vectors);
        Ok(Embeddings { vectors, tokens_used: 0 })
    }
}
