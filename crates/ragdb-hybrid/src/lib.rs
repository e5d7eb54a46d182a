//! Hybrid retrieval: the combined vector + lexical store, score fusion,
//! reranking, the hypothetical-document fallback and the query service.

pub mod fusion;
pub mod hyde;
pub mod rerank;
pub mod service;
pub mod store;

pub use fusion::{fuse, FusionEngine, FusionParams};
pub use hyde::{Branch, HydeController, Resolved};
pub use rerank::RerankStage;
pub use service::{Components, QueryOutcome, QueryRequest, QueryResponse, RagService};
pub use store::HybridStore;
