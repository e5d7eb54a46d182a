//! Domain types shared by the store, fusion and serving layers.

use serde::{Deserialize, Serialize};
use std::fmt;

pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Identity of a persisted chunk: `(repo, path, chunk_index)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkRef {
    pub repo: String,
    pub path: String,
    pub chunk_index: i32,
}

impl ChunkRef {
    pub fn new(repo: impl Into<String>, path: impl Into<String>, chunk_index: i32) -> Self {
        Self { repo: repo.into(), path: path.into(), chunk_index }
    }

    /// Flat row key used by both index halves. Backslash and `|` inside repo and
    /// path are escaped with a backslash, so distinct identities never share a key.
    pub fn key(&self) -> String {
        format!("{}|{}|{}", escape_key_part(&self.repo), escape_key_part(&self.path), self.chunk_index)
    }
}

fn escape_key_part(part: &str) -> String {
    let mut out = String::with_capacity(part.len());
    for c in part.chars() {
        if c == '\\' || c == '|' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

impl fmt::Display for ChunkRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.path, self.chunk_index)
    }
}

/// A pre-embedded fragment of a source document, as written by batch upsert.
///
/// `content_hash` is recomputed by the store; any value supplied by a client
/// is ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub repo: String,
    pub path: String,
    #[serde(alias = "chunk_id", alias = "chunkIndex")]
    pub chunk_index: i32,
    pub content: String,
    #[serde(default)]
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default, alias = "content_sha", skip_serializing_if = "String::is_empty")]
    pub content_hash: String,
}

impl DocumentChunk {
    pub fn chunk_ref(&self) -> ChunkRef {
        ChunkRef::new(&self.repo, &self.path, self.chunk_index)
    }
}

/// A hit from the vector half of the store. `distance` ascends with dissimilarity.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub chunk: ChunkRef,
    pub content: String,
    pub metadata: Metadata,
    pub distance: f32,
}

/// A hit from the lexical half of the store. `rank` is higher-is-better.
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalHit {
    pub chunk: ChunkRef,
    pub content: String,
    pub metadata: Metadata,
    pub rank: f32,
}

/// Per-query merged view of one chunk with its partial and fused scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(flatten)]
    pub chunk: ChunkRef,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub vector_score: f32,
    #[serde(default)]
    pub lexical_score: f32,
    pub score: f32,
}

/// The document shape returned to API callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub repo: String,
    pub path: String,
    pub chunk_index: i32,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl From<&Candidate> for RetrievedChunk {
    fn from(c: &Candidate) -> Self {
        Self {
            repo: c.chunk.repo.clone(),
            path: c.chunk.path.clone(),
            chunk_index: c.chunk.chunk_index,
            content: c.content.clone(),
            metadata: c.metadata.clone(),
        }
    }
}

/// Embedding vectors plus provider-reported token usage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Embeddings {
    pub vectors: Vec<Vec<f32>>,
    pub tokens_used: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_accepts_legacy_field_names() {
        let raw = r#"{"repo":"r1","path":"p1.md","chunk_id":3,"content":"alpha","content_sha":"x"}"#;
        let chunk: DocumentChunk = serde_json::from_str(raw).expect("parse");
        assert_eq!(chunk.chunk_index, 3);
        assert_eq!(chunk.content_hash, "x");
        assert!(chunk.embedding.is_empty());
        assert_eq!(chunk.chunk_ref().key(), "r1|p1.md|3");
    }

    #[test]
    fn separators_inside_identity_do_not_collide() {
        let left = ChunkRef::new("a|b", "c", 0).key();
        let right = ChunkRef::new("a", "b|c", 0).key();
        assert_ne!(left, right);
        assert_eq!(left, r"a\|b|c|0");
        assert_ne!(ChunkRef::new(r"a\", "|b", 0).key(), ChunkRef::new("a", r"\|b", 0).key());
        assert_ne!(ChunkRef::new("a", "b|1", 2).key(), ChunkRef::new("a", "b", 1).key());
    }

    #[test]
    fn candidate_serializes_flat_identity() {
        let c = Candidate {
            chunk: ChunkRef::new("r", "a.md", 1),
            content: "body".into(),
            metadata: Metadata::new(),
            vector_score: 0.5,
            lexical_score: 0.0,
            score: 0.25,
        };
        let v = serde_json::to_value(&c).expect("json");
        assert_eq!(v["repo"], "r");
        assert_eq!(v["chunk_index"], 1);
        let back: Candidate = serde_json::from_value(v).expect("roundtrip");
        assert_eq!(back, c);
    }
}
