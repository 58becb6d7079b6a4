//! Deterministic fingerprint computation: `operation_tag` concatenated
//! with each ordered param, hashed and hex-encoded. Equal inputs produce
//! equal keys across processes on the same build.

use sha2::{Digest, Sha256};

pub fn fingerprint(operation_tag: &str, params: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(operation_tag.as_bytes());
    for param in params {
        hasher.update(0u8.to_ne_bytes()); // separator, avoids "ab"+"c" colliding with "a"+"bc"
        hasher.update(param.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_inputs_produce_same_key() {
        let a = fingerprint("media_processing", &["x.png".to_string(), "webp".to_string()]);
        let b = fingerprint("media_processing", &["x.png".to_string(), "webp".to_string()]);
        assert_eq!(a, b);
    }

    #[test]
    fn param_boundaries_are_not_ambiguous() {
        let a = fingerprint("op", &["ab".to_string(), "c".to_string()]);
        let b = fingerprint("op", &["a".to_string(), "bc".to_string()]);
        assert_ne!(a, b);
    }

    #[test]
    fn different_operation_tags_diverge() {
        let a = fingerprint("media_processing", &["x".to_string()]);
        let b = fingerprint("text_extraction", &["x".to_string()]);
        assert_ne!(a, b);
    }
}
