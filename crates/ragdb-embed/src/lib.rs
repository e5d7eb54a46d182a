//! ragdb-embed
//!
//! HTTP adapters for the embedding, rerank and text-generation collaborators,
//! plus the shared retry policy and the configuration-driven factory.

mod http;

pub mod factory;
pub mod generator;
pub mod providers;
pub mod rerank;
pub mod retry;

pub use factory::{build_embedder, build_generator, build_reranker, Provider};
pub use generator::ChatGenerator;
pub use providers::{BgeEmbedder, ChutesEmbedder, HashEmbedder, OllamaEmbedder, OpenAiEmbedder};
pub use rerank::HttpReranker;
pub use retry::RetryPolicy;
