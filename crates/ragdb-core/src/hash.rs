/// Deterministic digest of chunk content; the only signal used to decide
/// whether a stored row needs rewriting.
pub fn content_hash(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}

/// Short digest for cache-key components.
pub fn short_hash(input: &str) -> String {
    let hex = blake3::hash(input.as_bytes()).to_hex();
    hex.as_str()[..32].to_string()
}

/// Lower-cases and collapses whitespace so trivially different spellings of
/// the same question share cache entries.
pub fn normalize_text(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_stable_and_sensitive() {
        assert_eq!(content_hash("alpha"), content_hash("alpha"));
        assert_ne!(content_hash("alpha"), content_hash("alpha "));
        assert_eq!(content_hash("alpha").len(), 64);
    }

    #[test]
    fn normalize_collapses_case_and_spacing() {
        assert_eq!(normalize_text("  What IS\tHyDE? "), "what is hyde?");
        assert_eq!(short_hash(&normalize_text("A b")), short_hash("a   b"));
    }
}
