use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use ragdb_core::traits::Embedder;
use ragdb_core::types::Embeddings;
use ragdb_core::Result;

use super::openai::EmbedResponse as OpenAiResponse;
use super::{ensure_count, DimensionCell};
use crate::http::{build_client, decode, post_json};
use crate::retry::RetryPolicy;

/// Batch `/embed` endpoint that retries throttling and server errors.
pub struct ChutesEmbedder {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
    model: Option<String>,
    retry: RetryPolicy,
    dim: DimensionCell,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    inputs: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EmbedResponse {
    Rows { data: Vec<Vec<f32>> },
    OpenAi(OpenAiResponse),
}

impl ChutesEmbedder {
    pub fn new(url: String, token: Option<String>, model: Option<String>, dimension: Option<usize>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            url,
            token,
            model: model.filter(|m| !m.trim().is_empty()),
            retry: RetryPolicy::exponential(),
            dim: DimensionCell::new(dimension),
        })
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl Embedder for ChutesEmbedder {
    fn name(&self) -> &str {
        "chutes"
    }

    fn dim(&self) -> Option<usize> {
        self.dim.get()
    }

    async fn embed(&self, texts: &[String]) -> Result<Embeddings> {
        if texts.is_empty() {
            return Ok(Embeddings::default());
        }
        let body = EmbedRequest { inputs: texts, model: self.model.as_deref() };
        let bytes = self
            .retry
            .run("chutes.embed", || post_json(&self.client, &self.url, self.token.as_deref(), &body))
            .await?;
        let vectors = match decode::<EmbedResponse>(&bytes, "chutes embedding")? {
            EmbedResponse::Rows { data } => data,
            EmbedResponse::OpenAi(resp) => {
                debug!("chutes answered in openai shape");
                resp.into_vectors()
            }
        };
        ensure_count(vectors.len(), texts.len(), self.name())?;
        self.dim.observe(&vectors);
        Ok(Embeddings { vectors, tokens_used: 0 })
    }
}
