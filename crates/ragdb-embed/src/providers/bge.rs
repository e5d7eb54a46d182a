use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use ragdb_core::traits::Embedder;
use ragdb_core::types::Embeddings;
use ragdb_core::{Error, Result};

use super::DimensionCell;
use crate::http::{build_client, decode, post_json};

/// Per-item REST embedding service (text-embeddings-inference style).
pub struct BgeEmbedder {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
    dim: DimensionCell,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    inputs: &'a str,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EmbedResponse {
    Object { embedding: Vec<f32> },
    Flat(Vec<f32>),
    Nested(Vec<Vec<f32>>),
}

impl EmbedResponse {
    fn into_vector(self) -> Option<Vec<f32>> {
        match self {
            Self::Object { embedding } | Self::Flat(embedding) => Some(embedding),
            Self::Nested(mut rows) if rows.len() == 1 => rows.pop(),
            Self::Nested(_) => None,
        }
    }
}

impl BgeEmbedder {
    pub fn new(url: String, token: Option<String>, dimension: Option<usize>, timeout: Duration) -> Result<Self> {
        Ok(Self { client: build_client(timeout)?, url, token, dim: DimensionCell::new(dimension) })
    }
}

#[async_trait]
impl Embedder for BgeEmbedder {
    fn name(&self) -> &str {
        "bge"
    }

    fn dim(&self) -> Option<usize> {
        self.dim.get()
    }

    async fn embed(&self, texts: &[String]) -> Result<Embeddings> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            let bytes = post_json(&self.client, &self.url, self.token.as_deref(), &EmbedRequest { inputs: text }).await?;
            let resp: EmbedResponse = decode(&bytes, "bge embedding")?;
            let vector = resp
                .into_vector()
                .ok_or_else(|| Error::Protocol("bge returned several embeddings for one input".into()))?;
            vectors.push(vector);
        }
        self.dim.observe(&vectors);
        Ok(Embeddings { vectors, tokens_used: 0 })
    }
}
