//! Content-addressed cache keys. Any change to the normalised inputs, the
//! stage parameters or the pipeline version yields a new key, so stale
//! entries age out instead of being evicted.

use ragdb_core::hash::{normalize_text, short_hash};
use ragdb_core::types::Candidate;

pub fn question_hash(question: &str) -> String {
    short_hash(&normalize_text(question))
}

pub fn retrieval_key(question: &str, alpha: f32, candidates: usize) -> String {
    format!("retr:hybrid:{}:alpha:{alpha:.3}:k:{candidates}", question_hash(question))
}

/// Hash of the candidate identities and contents, in order.
pub fn candidate_set_hash(candidates: &[Candidate]) -> String {
    let mut joined = String::new();
    for c in candidates {
        joined.push_str(&c.chunk.key());
        joined.push('\u{1f}');
        joined.push_str(&short_hash(&c.content));
        joined.push('\n');
    }
    short_hash(&joined)
}

pub fn rerank_key(question: &str, candidates: &[Candidate], model: &str) -> String {
    format!("rerank:{}:on:{}:model:{model}", question_hash(question), candidate_set_hash(candidates))
}

/// Final-answer key. `history` is whatever the caller sent, serialised.
pub fn answer_key(question: &str, history: &str, pipeline_version: &str, escalate: bool) -> String {
    let material = format!("{}\n{}", normalize_text(question), normalize_text(history));
    let mode = if escalate { "fallback" } else { "plain" };
    format!("answer:{}:{mode}:{pipeline_version}", short_hash(&material))
}

pub fn lock_key(key: &str) -> String {
    format!("lock:{key}")
}
