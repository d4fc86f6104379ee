//! One-way lookup digest for raw credentials.

use sha2::{Digest, Sha256};

/// Hashes a raw credential value using SHA-256.
///
/// The digest is the store's lookup key, so it is deliberately unsalted and
/// deterministic. Output is 64 lowercase hex characters.
#[must_use]
pub fn hash_token(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_token() {
        let token = "test-token-value";
        let hash = hash_token(token);

        // SHA-256 produces 64 hex characters
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));

        assert_eq!(hash, hash_token(token));
        assert_ne!(hash, hash_token("different-token"));
    }

    #[test]
    fn test_hash_token_known_vector() {
        assert_eq!(
            hash_token("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
