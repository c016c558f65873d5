//! Stable content hashes used for plan identity and script naming.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::errors::BatchError;
use crate::serde::to_canonical_json_bytes;

/// Computes a stable SHA256 hash for the provided serializable value.
pub fn stable_hash_string<T: Serialize>(value: &T) -> Result<String, BatchError> {
    let bytes = to_canonical_json_bytes(value)?;
    let digest = Sha256::digest(&bytes);
    Ok(format!("{:x}", digest))
}

/// First eight hex characters of [`stable_hash_string`].
pub fn short_hash<T: Serialize>(value: &T) -> Result<String, BatchError> {
    let mut full = stable_hash_string(value)?;
    full.truncate(8);
    Ok(full)
}
