//! Represents objects stored in the bucket and the listings returned for them.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::{fmt, io};

/// Upper bound for a single list call.
pub const MAX_LIST_LIMIT: usize = 1000;

/// HTTP-facing metadata recorded alongside an object.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HttpMetadata {
    /// Content type (MIME type). `None` means the payload is served as binary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// Summary of a single stored object, as returned by `put` and `list`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectDescriptor {
    /// Object key (unique within the bucket).
    pub key: String,

    /// Size in bytes.
    pub size: u64,

    /// MD5 checksum of the payload, lowercase hex.
    pub etag: String,

    /// The etag wrapped in double quotes, ready for an `ETag` header.
    pub http_etag: String,

    /// When the object was written.
    pub uploaded: DateTime<Utc>,

    pub http_metadata: HttpMetadata,
}

impl ObjectDescriptor {
    pub fn new(
        key: impl Into<String>,
        size: u64,
        etag: impl Into<String>,
        content_type: Option<String>,
        uploaded: DateTime<Utc>,
    ) -> Self {
        let etag = etag.into();
        Self {
            key: key.into(),
            size,
            http_etag: format!("\"{}\"", etag),
            etag,
            uploaded,
            http_metadata: HttpMetadata { content_type },
        }
    }
}

/// Streamed payload of an object.
pub type BodyStream = BoxStream<'static, io::Result<Bytes>>;

/// An object returned by `get`: its descriptor plus a stream over the payload.
pub struct ObjectBody {
    pub descriptor: ObjectDescriptor,
    pub body: BodyStream,
}

impl fmt::Debug for ObjectBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectBody")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// A single bounded page of objects, ordered by key.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectListing {
    pub objects: Vec<ObjectDescriptor>,

    /// Whether more objects exist past this page.
    pub truncated: bool,

    /// Opaque marker for the last returned key; only set when truncated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

impl ObjectListing {
    pub fn keys(&self) -> Vec<String> {
        self.objects.iter().map(|o| o.key.clone()).collect()
    }
}

/// Options accepted by `list`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListOptions {
    pub limit: usize,
}

impl ListOptions {
    /// List at most `limit` objects. The limit is clamped to `1..=1000`.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: limit.clamp(1, MAX_LIST_LIMIT),
        }
    }

    /// The effective limit, re-clamped in case the field was set directly.
    pub fn effective_limit(&self) -> usize {
        self.limit.clamp(1, MAX_LIST_LIMIT)
    }
}

impl Default for ListOptions {
    fn default() -> Self {
        Self::with_limit(MAX_LIST_LIMIT)
    }
}

/// Options accepted by `put`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PutOptions {
    pub content_type: Option<String>,
}
