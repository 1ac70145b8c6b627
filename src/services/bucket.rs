//! The bucket capability the worker is built on.
//!
//! Handlers never reach for a global binding; they receive an
//! `Arc<dyn Bucket>` through router state, so the backing store can be the
//! durable `LocalBucket`, the `MemoryBucket`, or a test double.

use crate::models::object::{ListOptions, ObjectBody, ObjectDescriptor, ObjectListing, PutOptions};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use std::io;
use thiserror::Error;

const MAX_OBJECT_KEY_LEN: usize = 1024;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid object key `{0}`")]
    InvalidObjectKey(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Flat key-value object store.
///
/// Every call may fail with a backend error; callers decide how to report it.
#[async_trait]
pub trait Bucket: Send + Sync {
    /// Store `value` under `key`, replacing any previous object.
    async fn put(
        &self,
        key: &str,
        value: Bytes,
        opts: PutOptions,
    ) -> StorageResult<ObjectDescriptor>;

    /// Fetch an object and its payload. `Ok(None)` when the key does not exist.
    async fn get(&self, key: &str) -> StorageResult<Option<ObjectBody>>;

    /// List objects in key order, bounded by `opts.limit`.
    async fn list(&self, opts: ListOptions) -> StorageResult<ObjectListing>;

    /// Delete all `keys` in one call. Missing keys are ignored.
    async fn delete(&self, keys: &[String]) -> StorageResult<()>;
}

/// Basic key validation to avoid trivial path traversal vectors.
///
/// Rejects empty or oversized keys, keys that begin with `/` or contain `..`,
/// and keys with control characters or backslashes.
pub fn validate_key(key: &str) -> StorageResult<()> {
    let invalid = key.is_empty()
        || key.len() > MAX_OBJECT_KEY_LEN
        || key.starts_with('/')
        || key.contains("..")
        || key.bytes().any(|b| b.is_ascii_control() || b == b'\\');

    if invalid {
        return Err(StorageError::InvalidObjectKey(key.to_string()));
    }
    Ok(())
}

pub fn encode_cursor(key: &str) -> String {
    general_purpose::STANDARD.encode(key)
}
