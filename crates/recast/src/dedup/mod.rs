//! Content fingerprinting and duplicate suppression.
//!
//! Near-duplicate detection works on normalized text: case,
//! punctuation, and whitespace-run differences all collapse to the
//! same fingerprint. The fingerprint is a truncated SHA-256, which is
//! collision-negligible for this purpose without any cryptographic
//! exactness claim.

mod cache;

pub use cache::{BatchFilter, CacheStats, Clock, DedupCache, SystemClock, Verdict};

use std::fmt;

use sha2::{Digest, Sha256};

/// 128-bit digest of normalized text, the duplicate-detection key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 16]);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Lowercase, drop every character that is not a word character or
/// whitespace, and collapse whitespace runs to single spaces.
pub fn normalize(text: &str) -> String {
    let stripped: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Fingerprint of `text`, or `None` when nothing survives
/// normalization. Empty text is never cached or compared.
pub fn fingerprint(text: &str) -> Option<Fingerprint> {
    let normalized = normalize(text);
    if normalized.is_empty() {
        return None;
    }
    let digest = Sha256::digest(normalized.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Some(Fingerprint(bytes))
}
