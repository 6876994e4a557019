//! Canonicalization and content hashing
//!
//! A request's canonical form is its `serde_json` encoding. Struct fields are
//! emitted in declaration order, so equal values always encode to equal bytes.
//! The content hash is XXH64 with seed 0 over those bytes.

use std::hash::Hasher;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use twox_hash::XxHash64;

use crate::domain::ports::ContentHash;
use crate::error::{Error, Result};

const SEED: u64 = 0;

/// Encode `request` into its canonical bytes.
pub fn canonicalize<R>(request: &R) -> Result<Bytes>
where
    R: Serialize + ?Sized,
{
    serde_json::to_vec(request)
        .map(Bytes::from)
        .map_err(|e| Error::HashingFailed(e.to_string()))
}

/// Digest canonical bytes.
pub fn content_hash(bytes: &[u8]) -> ContentHash {
    let mut hasher = XxHash64::with_seed(SEED);
    hasher.write(bytes);
    ContentHash::from_u64(hasher.finish())
}

/// Canonicalize and hash in one step.
pub fn hash_request<R>(request: &R) -> Result<(Bytes, ContentHash)>
where
    R: Serialize + ?Sized,
{
    let bytes = canonicalize(request)?;
    let hash = content_hash(&bytes);
    Ok((bytes, hash))
}

/// Decode canonical bytes back into a typed request.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> std::result::Result<T, serde_json::Error> {
    serde_json::from_slice(bytes)
}
