//! ragdb-text
//!
//! Tantivy-backed lexical index over chunk content. Blocking API; async
//! callers are expected to hop onto a blocking thread.
pub mod tantivy_utils;
pub mod index;

pub use index::{normalize_bm25, LexicalIndex};
