//! Builds exactly one backend per capability from configuration.

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use ragdb_core::config::{EmbeddingSettings, GeneratorSettings, RerankerSettings};
use ragdb_core::traits::{Embedder, Generator, Reranker};
use ragdb_core::{Error, Result};

use crate::generator::ChatGenerator;
use crate::http::with_suffix;
use crate::providers::{BgeEmbedder, ChutesEmbedder, HashEmbedder, OllamaEmbedder, OpenAiEmbedder};
use crate::rerank::HttpReranker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Ollama,
    Bge,
    Chutes,
    Hash,
}

impl Provider {
    /// Explicit provider name wins; otherwise the endpoint URL decides.
    pub fn resolve(cfg: &EmbeddingSettings) -> Result<Self> {
        let name = cfg.provider.trim().to_lowercase();
        if name.is_empty() {
            let url = cfg.endpoint.to_lowercase();
            return Ok(if url.contains("chutes") {
                Self::Chutes
            } else if url.contains("ollama") {
                Self::Ollama
            } else if !cfg.model.trim().is_empty() {
                Self::OpenAi
            } else {
                Self::Bge
            });
        }
        match name.as_str() {
            "openai" | "openai-compatible" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            "bge" | "tei" => Ok(Self::Bge),
            "chutes" => Ok(Self::Chutes),
            "hash" => Ok(Self::Hash),
            other => Err(Error::Configuration(format!("unknown embedding provider '{other}'"))),
        }
    }
}

fn openai_url(endpoint: &str) -> String {
    let trimmed = endpoint.trim().trim_end_matches('/');
    if trimmed.ends_with("/embeddings") {
        trimmed.to_string()
    } else if trimmed.ends_with("/v1") {
        format!("{trimmed}/embeddings")
    } else {
        format!("{trimmed}/v1/embeddings")
    }
}

pub fn build_embedder(cfg: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    if !cfg.is_configured() {
        return Err(Error::ConfigurationMissing("embedding endpoint".into()));
    }
    let provider = Provider::resolve(cfg)?;
    let timeout = Duration::from_secs(cfg.timeout_secs.max(1));
    let endpoint = cfg.endpoint.trim().trim_end_matches('/').to_string();
    let key = cfg.resolved_api_key();
    let model = cfg.model.trim().to_string();
    info!(?provider, model = %model, dimension = ?cfg.dimension, "embedding backend selected");
    Ok(match provider {
        Provider::OpenAi => Arc::new(OpenAiEmbedder::new(openai_url(&endpoint), key, model, cfg.dimension, timeout)?),
        Provider::Ollama => Arc::new(OllamaEmbedder::new(endpoint, model, cfg.dimension, timeout)?),
        Provider::Bge => Arc::new(BgeEmbedder::new(endpoint, key, cfg.dimension, timeout)?),
        Provider::Chutes => Arc::new(ChutesEmbedder::new(with_suffix(&endpoint, "/embed"), key, Some(model), cfg.dimension, timeout)?),
        Provider::Hash => Arc::new(cfg.dimension.map_or_else(HashEmbedder::default, HashEmbedder::new)),
    })
}

pub fn build_reranker(cfg: &RerankerSettings) -> Result<Option<Arc<dyn Reranker>>> {
    if !cfg.is_configured() {
        return Ok(None);
    }
    let token = cfg.api_key.clone().filter(|k| !k.trim().is_empty());
    let reranker = HttpReranker::new(cfg.endpoint.trim().to_string(), token, cfg.model.clone(), cfg.timeout())?;
    Ok(Some(Arc::new(reranker)))
}

pub fn build_generator(cfg: &GeneratorSettings) -> Result<Option<Arc<dyn Generator>>> {
    if !cfg.is_configured() {
        return Ok(None);
    }
    Ok(Some(Arc::new(ChatGenerator::from_settings(cfg)?)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(provider: &str, endpoint: &str, model: &str) -> EmbeddingSettings {
        EmbeddingSettings {
            provider: provider.into(),
            endpoint: endpoint.into(),
            model: model.into(),
            ..EmbeddingSettings::default()
        }
    }

    #[test]
    fn url_heuristics_pick_provider() {
        assert_eq!(Provider::resolve(&settings("", "https://chutes-bge.chutes.ai", "")).ok(), Some(Provider::Chutes));
        assert_eq!(Provider::resolve(&settings("", "http://ollama:11434/api/embeddings", "")).ok(), Some(Provider::Ollama));
        assert_eq!(Provider::resolve(&settings("", "https://api.example.com", "text-embedding-3-small")).ok(), Some(Provider::OpenAi));
        assert_eq!(Provider::resolve(&settings("", "http://bge:8080/embed", "")).ok(), Some(Provider::Bge));
    }

    #[test]
    fn explicit_provider_overrides_url() {
        assert_eq!(Provider::resolve(&settings("OLLAMA", "https://chutes.ai", "")).ok(), Some(Provider::Ollama));
        assert!(matches!(Provider::resolve(&settings("word2vec", "http://x", "")), Err(Error::Configuration(_))));
    }

    #[test]
    fn openai_url_normalisation() {
        assert_eq!(openai_url("https://api.openai.com"), "https://api.openai.com/v1/embeddings");
        assert_eq!(openai_url("https://api.openai.com/v1/"), "https://api.openai.com/v1/embeddings");
        assert_eq!(openai_url("http://h/v1/embeddings"), "http://h/v1/embeddings");
    }

    #[test]
    fn unconfigured_embedding_is_reported() {
        let err = build_embedder(&EmbeddingSettings::default()).err();
        assert!(matches!(err, Some(Error::ConfigurationMissing(_))));
        assert!(build_embedder(&settings("hash", "", "")).is_ok());
    }
}
