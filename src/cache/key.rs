//! Cache key derivation.

use sha2::{Digest, Sha256};

/// Normalizes a query for cache lookups: surrounding whitespace removed,
/// lowercased.
#[must_use]
pub fn normalize(query: &str) -> String {
    query.trim().to_lowercase()
}

/// Derives the cache key for a query (SHA-256 hex of the normalized text).
#[must_use]
pub fn cache_key(query: &str) -> String {
    content_hash(&normalize(query))
}

/// SHA-256 hex digest of the exact text.
#[must_use]
pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_key_ignores_case_and_padding() {
        assert_eq!(
            cache_key("What is the bandgap of MAPbI3?"),
            cache_key("  what is the BANDGAP of mapbi3?\n")
        );
        assert_ne!(cache_key("perc"), cache_key("topcon"));
    }

    #[test]
    fn test_content_hash_is_exact() {
        assert_ne!(content_hash("PERC"), content_hash("perc"));
        assert_eq!(content_hash("").len(), 64);
    }

    proptest! {
        #[test]
        fn prop_key_is_hex_sha256(query in ".{0,200}") {
            let key = cache_key(&query);
            prop_assert_eq!(key.len(), 64);
            prop_assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        }

        #[test]
        fn prop_normalization_is_idempotent(query in ".{0,200}") {
            let once = normalize(&query);
            prop_assert_eq!(normalize(&once), once.clone());
            prop_assert_eq!(cache_key(&once), cache_key(&query));
        }
    }
}
