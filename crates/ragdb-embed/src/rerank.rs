//! Cross-encoder style relevance scoring over HTTP.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use ragdb_core::traits::Reranker;
use ragdb_core::{Error, Result};

use crate::http::{build_client, decode, post_json};

pub struct HttpReranker {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
    model: String,
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    documents: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RerankResponse {
    Scores { scores: Vec<f32> },
    Results { results: Vec<RankedDocument> },
}

#[derive(Deserialize)]
struct RankedDocument {
    index: usize,
    #[serde(alias = "score")]
    relevance_score: f32,
}

impl RerankResponse {
    /// Scores in input order, or a protocol error when any slot is missing.
    fn into_scores(self, expected: usize) -> Result<Vec<f32>> {
        let scores = match self {
            Self::Scores { scores } => scores,
            Self::Results { results } => {
                let mut slots = vec![None; expected];
                for r in results {
                    let slot = slots
                        .get_mut(r.index)
                        .ok_or_else(|| Error::Protocol(format!("rerank index {} out of range", r.index)))?;
                    *slot = Some(r.relevance_score);
                }
                slots
                    .into_iter()
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| Error::Protocol("rerank response skipped documents".into()))?
            }
        };
        if scores.len() == expected {
            Ok(scores)
        } else {
            Err(Error::Protocol(format!("rerank returned {} scores for {expected} documents", scores.len())))
        }
    }
}

impl HttpReranker {
    pub fn new(url: String, token: Option<String>, model: String, timeout: Duration) -> Result<Self> {
        Ok(Self { client: build_client(timeout)?, url, token, model })
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    fn model(&self) -> &str {
        if self.model.is_empty() { "default" } else { &self.model }
    }

    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<f32>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let model = Some(self.model.as_str()).filter(|m| !m.is_empty());
        let body = RerankRequest { query, documents, model };
        let bytes = post_json(&self.client, &self.url, self.token.as_deref(), &body).await?;
        decode::<RerankResponse>(&bytes, "rerank")?.into_scores(documents.len())
    }
}
