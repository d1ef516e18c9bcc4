//! Checksum helpers for ingestion pipelines.

use std::path::Path;

use anyhow::Result;
use sha2::{Digest, Sha256};

/// SHA-256 of a string, hex-encoded.
pub fn sha256_text(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// SHA-256 of a file's bytes, hex-encoded.
pub fn sha256_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digest() {
        assert_eq!(
            sha256_text("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn digest_changes_with_content() {
        assert_ne!(sha256_text("a"), sha256_text("b"));
        assert_eq!(sha256_text("same"), sha256_text("same"));
    }
}
