//! Content hashing utilities for cache keys.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Compute SHA256 hash of a serializable value.
///
/// The value is serialized to JSON before hashing, ensuring deterministic output.
/// Returns a 64-character lowercase hexadecimal string.
///
/// # Errors
/// Returns an error if the value cannot be serialized to JSON.
pub fn compute_hash<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(value)?;
    Ok(sha256_hex(json.as_bytes()))
}

/// SHA256 of raw bytes as lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Hash of a source file: its bytes followed by its modification time.
///
/// Sources without a modification time hash their bytes alone.
pub fn file_hash(content: &[u8], modified: Option<SystemTime>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    if let Some(nanos) = modified
        .and_then(|m| m.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos())
    {
        hasher.update(nanos.to_le_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Hash used when a table has no backing file (archive-only content).
pub fn name_hash(table: &str) -> String {
    sha256_hex(format!("table:{}", table.to_lowercase()).as_bytes())
}
