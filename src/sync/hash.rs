//! Content hashing for sync operations.
//!
//! Every file the engine writes or reads is fingerprinted with SHA256. The
//! hash cache compares fingerprints to decide whether a write is needed, so
//! the same function is used for text files and for base64-encoded binary
//! companions.

use sha2::{Digest, Sha256};

/// Compute the SHA256 hash of serialized content, as lowercase hex.
///
/// # Example
///
/// ```
/// let hash = devsync::sync::content_hash("---\nid: a1\n---\n");
/// assert_eq!(hash.len(), 64);
/// ```
#[must_use]
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Check if a file needs to be written.
///
/// Returns `true` if:
/// - There is no stored hash (never written or read)
/// - The current hash differs from the stored hash
///
/// Returns `false` if the hashes match (no change).
#[must_use]
pub fn has_changed(current_hash: &str, stored_hash: Option<&str>) -> bool {
    stored_hash.is_none_or(|h| h != current_hash)
}
