//! OpenAI-compatible chat completion client used for hypothesis generation
//! and final answers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use ragdb_core::config::GeneratorSettings;
use ragdb_core::traits::Generator;
use ragdb_core::{Error, Result};

use crate::http::{build_client, decode, post_json, with_suffix};
use crate::retry::RetryPolicy;

const MAX_ATTEMPTS: u32 = 3;

pub struct ChatGenerator {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
    temperature: f32,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    stream: bool,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: String,
}

impl ChatGenerator {
    pub fn from_settings(cfg: &GeneratorSettings) -> Result<Self> {
        let attempts = cfg.max_retries.clamp(1, MAX_ATTEMPTS);
        Ok(Self {
            client: build_client(Duration::from_secs(cfg.timeout_secs.max(1)))?,
            url: with_suffix(&cfg.endpoint, "/chat/completions"),
            api_key: cfg.resolved_api_key(),
            model: cfg.model.clone(),
            max_tokens: cfg.max_tokens,
            temperature: cfg.temperature,
            retry: RetryPolicy::exponential().with_max_attempts(attempts),
        })
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry.with_max_attempts(retry.max_attempts.min(MAX_ATTEMPTS));
        self
    }
}

#[async_trait]
impl Generator for ChatGenerator {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: [ChatMessage { role: "user", content: prompt }],
            stream: false,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };
        let bytes = self
            .retry
            .run("generator.complete", || post_json(&self.client, &self.url, self.api_key.as_deref(), &body))
            .await?;
        let resp: ChatResponse = decode(&bytes, "chat completion")?;
        resp.choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| Error::Protocol("chat completion returned no choices".into()))
    }
}
