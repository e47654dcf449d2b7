//! Content fingerprinting.
//!
//! A fingerprint is the SHA-256 of [`canonical_form`](crate::normalize::canonical_form),
//! rendered as 64 lowercase hex characters. Incidental case and whitespace
//! differences never change it.

use sha2::{Digest, Sha256};

use crate::normalize::canonical_form;

/// Length of a rendered fingerprint.
pub const FINGERPRINT_LEN: usize = 64;

/// Hex SHA-256 of the canonical form of `text`.
pub fn fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_form(text).as_bytes());
    hex::encode(hasher.finalize())
}

/// Stateless hasher handed to the orchestrator.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentHasher;

impl ContentHasher {
    pub fn hash(&self, text: &str) -> String {
        fingerprint(text)
    }
}

pub fn is_fingerprint(s: &str) -> bool {
    s.len() == FINGERPRINT_LEN && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
