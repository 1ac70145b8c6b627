//! Worker Integration Tests
//!
//! Drives the router in process with `tower::ServiceExt::oneshot`; no network
//! I/O. Each test builds its own bucket so state never leaks between tests.

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use bucket_worker::{
    create_router,
    models::{
        object::{ListOptions, ObjectBody, ObjectDescriptor, ObjectListing, PutOptions},
        payload::{ASN_HEADER, COUNTRY_HEADER, WritePayload},
    },
    services::{
        bucket::{Bucket, StorageError, StorageResult},
        local_bucket::LocalBucket,
        memory_bucket::MemoryBucket,
        worker_service::WorkerService,
    },
};
use bytes::Bytes;
use http_body_util::BodyExt;
use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};
use tempfile::TempDir;
use tower::ServiceExt;

const JSON_CTYPE: &str = "application/json; charset=utf-8";

/// Which bucket call should fail.
#[derive(Clone, Copy, PartialEq, Eq)]
enum FailOn {
    Put,
    Get,
    List,
    Delete,
}

/// Wraps a `MemoryBucket`, failing one kind of call and recording the
/// arguments the worker passes through.
struct FlakyBucket {
    inner: MemoryBucket,
    fail_on: Option<FailOn>,
    puts: AtomicUsize,
    max_list_limit: AtomicUsize,
    max_delete_batch: AtomicUsize,
}

impl FlakyBucket {
    fn new(fail_on: Option<FailOn>) -> Self {
        Self {
            inner: MemoryBucket::new(),
            fail_on,
            puts: AtomicUsize::new(0),
            max_list_limit: AtomicUsize::new(0),
            max_delete_batch: AtomicUsize::new(0),
        }
    }

    fn check(&self, op: FailOn) -> StorageResult<()> {
        if self.fail_on == Some(op) {
            return Err(StorageError::Io(io::Error::other("backend unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl Bucket for FlakyBucket {
    async fn put(
        &self,
        key: &str,
        value: Bytes,
        opts: PutOptions,
    ) -> StorageResult<ObjectDescriptor> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.check(FailOn::Put)?;
        self.inner.put(key, value, opts).await
    }

    async fn get(&self, key: &str) -> StorageResult<Option<ObjectBody>> {
        self.check(FailOn::Get)?;
        self.inner.get(key).await
    }

    async fn list(&self, opts: ListOptions) -> StorageResult<ObjectListing> {
        self.max_list_limit.fetch_max(opts.limit, Ordering::SeqCst);
        self.check(FailOn::List)?;
        self.inner.list(opts).await
    }

    async fn delete(&self, keys: &[String]) -> StorageResult<()> {
        self.max_delete_batch.fetch_max(keys.len(), Ordering::SeqCst);
        self.check(FailOn::Delete)?;
        self.inner.delete(keys).await
    }
}

fn app_with(bucket: Arc<dyn Bucket>, seed_writes: u32) -> Router {
    create_router(WorkerService::new(bucket, seed_writes))
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Option<String>, Vec<u8>) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap().to_string());
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, content_type, body.to_vec())
}

async fn seed(bucket: &dyn Bucket, keys: &[&str]) {
    for key in keys {
        bucket
            .put(key, Bytes::from(format!("payload-{key}")), PutOptions::default())
            .await
            .unwrap();
    }
}

// ============================================================================
// Root: seed writes then list
// ============================================================================

#[tokio::test]
async fn test_root_on_empty_bucket_writes_five_and_lists() {
    let bucket = Arc::new(MemoryBucket::new());
    let app = app_with(bucket.clone(), 5);

    let (status, content_type, body) = get(&app, "/").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some(JSON_CTYPE));
    let listing: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(listing["objects"].as_array().unwrap().len(), 5);
    assert_eq!(listing["truncated"], false);
    assert_eq!(bucket.len().await, 5);
}

#[tokio::test]
async fn test_root_with_single_seed_write() {
    let bucket = Arc::new(MemoryBucket::new());
    let app = app_with(bucket.clone(), 1);

    let (status, _, body) = get(&app, "/").await;

    assert_eq!(status, StatusCode::OK);
    let listing: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(listing["objects"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_root_payloads_carry_request_origin_and_sequence() {
    let bucket = Arc::new(MemoryBucket::new());
    let app = app_with(bucket.clone(), 3);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/")
                .header(header::HOST, "worker.local")
                .header(COUNTRY_HEADER, "DE")
                .header(ASN_HEADER, "3320")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let listing = bucket.list(ListOptions::default()).await.unwrap();
    let mut seqs = Vec::new();
    for key in listing.keys() {
        let (status, _, body) = get(&app, &format!("/{key}")).await;
        assert_eq!(status, StatusCode::OK);
        let payload: WritePayload = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.url.as_deref(), Some("http://worker.local/"));
        assert_eq!(payload.country.as_deref(), Some("DE"));
        assert_eq!(payload.asn.as_deref(), Some("3320"));
        seqs.push(payload.seq);
    }
    seqs.sort_unstable();
    assert_eq!(seqs, vec![0, 1, 2]);
}

#[tokio::test]
async fn test_root_list_limit_never_exceeds_1000() {
    let bucket = Arc::new(FlakyBucket::new(None));
    let app = app_with(bucket.clone(), 1);

    let (status, _, _) = get(&app, "/").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(bucket.max_list_limit.load(Ordering::SeqCst), 1000);
}

#[tokio::test]
async fn test_root_write_failure_aborts_remaining_writes() {
    let bucket = Arc::new(FlakyBucket::new(Some(FailOn::Put)));
    let app = app_with(bucket.clone(), 5);

    let (status, content_type, body) = get(&app, "/").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(content_type.unwrap().starts_with("text/plain"));
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("failed"), "body was {text:?}");
    assert!(text.contains("to bucket"));
    assert_eq!(bucket.puts.load(Ordering::SeqCst), 1);
    assert_eq!(bucket.max_list_limit.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_root_list_failure_returns_500() {
    let bucket = Arc::new(FlakyBucket::new(Some(FailOn::List)));
    let app = app_with(bucket.clone(), 2);

    let (status, _, body) = get(&app, "/").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let text = String::from_utf8(body).unwrap();
    assert!(text.starts_with("failed to get list"), "body was {text:?}");
    assert_eq!(bucket.puts.load(Ordering::SeqCst), 2);
}

// ============================================================================
// Single-object fetch
// ============================================================================

#[tokio::test]
async fn test_fetch_missing_key_returns_404() {
    let app = app_with(Arc::new(MemoryBucket::new()), 5);

    let (status, _, body) = get(&app, "/missing-key").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(String::from_utf8(body).unwrap(), "key missing-key not found");
}

#[tokio::test]
async fn test_fetch_favicon_is_a_key_lookup() {
    let bucket = Arc::new(MemoryBucket::new());
    let app = app_with(bucket.clone(), 5);

    let (status, _, body) = get(&app, "/favicon.ico").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(String::from_utf8(body).unwrap(), "key favicon.ico not found");

    bucket
        .put(
            "favicon.ico",
            Bytes::from_static(b"\x00\x00\x01\x00"),
            PutOptions {
                content_type: Some("image/x-icon".into()),
            },
        )
        .await
        .unwrap();
    let (status, content_type, body) = get(&app, "/favicon.ico").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("image/x-icon"));
    assert_eq!(body, b"\x00\x00\x01\x00");
}

#[tokio::test]
async fn test_fetch_written_key_returns_payload_as_binary() {
    let bucket = Arc::new(MemoryBucket::new());
    seed(bucket.as_ref(), &["abc"]).await;
    let app = app_with(bucket, 5);

    let (status, content_type, body) = get(&app, "/abc").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("application/octet-stream"));
    assert_eq!(body, b"payload-abc");
}

#[tokio::test]
async fn test_fetch_failure_returns_500() {
    let app = app_with(Arc::new(FlakyBucket::new(Some(FailOn::Get))), 5);

    let (status, _, body) = get(&app, "/anything").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let text = String::from_utf8(body).unwrap();
    assert!(text.starts_with("failed to get object"), "body was {text:?}");
}

// ============================================================================
// Batch delete
// ============================================================================

#[tokio::test]
async fn test_delete_removes_existing_objects() {
    let bucket = Arc::new(MemoryBucket::new());
    seed(bucket.as_ref(), &["k1", "k2", "k3"]).await;
    let app = app_with(bucket.clone(), 5);

    let (status, content_type, body) = get(&app, "/delete").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some(JSON_CTYPE));
    let keys: Vec<String> = serde_json::from_slice(&body).unwrap();
    assert_eq!(keys, vec!["k1", "k2", "k3"]);
    assert!(bucket.is_empty().await);
}

#[tokio::test]
async fn test_delete_caps_batch_at_ten() {
    let bucket = Arc::new(FlakyBucket::new(None));
    let keys: Vec<String> = (0..25).map(|i| format!("key-{i:02}")).collect();
    for key in &keys {
        bucket
            .put(key, Bytes::from_static(b"x"), PutOptions::default())
            .await
            .unwrap();
    }
    let app = app_with(bucket.clone(), 5);

    let (status, _, body) = get(&app, "/delete").await;

    assert_eq!(status, StatusCode::OK);
    let deleted: Vec<String> = serde_json::from_slice(&body).unwrap();
    assert_eq!(deleted, keys[..10].to_vec());
    assert_eq!(bucket.max_delete_batch.load(Ordering::SeqCst), 10);
    assert_eq!(bucket.inner.len().await, 15);
}

#[tokio::test]
async fn test_delete_on_empty_bucket_returns_empty_list() {
    let bucket = Arc::new(FlakyBucket::new(None));
    let app = app_with(bucket.clone(), 5);

    let (status, _, body) = get(&app, "/delete").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"[]");
    assert_eq!(bucket.max_delete_batch.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_delete_failure_returns_500() {
    let bucket = Arc::new(FlakyBucket::new(Some(FailOn::Delete)));
    seed(&bucket.inner, &["a"]).await;
    let app = app_with(bucket.clone(), 5);

    let (status, _, body) = get(&app, "/delete").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(String::from_utf8(body).unwrap().contains("failed"));
    assert_eq!(bucket.inner.len().await, 1);
}

#[tokio::test]
async fn test_any_method_uses_the_same_routing() {
    let bucket = Arc::new(MemoryBucket::new());
    seed(bucket.as_ref(), &["a", "b"]).await;
    let app = app_with(bucket.clone(), 5);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/delete")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(bucket.is_empty().await);
}

// ============================================================================
// Local (SQLite + disk) backend
// ============================================================================

async fn local_app() -> (Router, Arc<LocalBucket>, TempDir) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let db_url = format!("sqlite://{}", dir.path().join("meta.db").display());
    let bucket = Arc::new(
        LocalBucket::open(&db_url, dir.path().join("objects"))
            .await
            .expect("Failed to open local bucket"),
    );
    (app_with(bucket.clone(), 5), bucket, dir)
}

#[tokio::test]
async fn test_local_backend_full_cycle() {
    let (app, _bucket, _dir) = local_app().await;

    let (status, _, body) = get(&app, "/").await;
    assert_eq!(status, StatusCode::OK);
    let listing: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let objects = listing["objects"].as_array().unwrap();
    assert_eq!(objects.len(), 5);

    let key = objects[0]["key"].as_str().unwrap().to_string();
    let size = objects[0]["size"].as_u64().unwrap();
    let (status, _, body) = get(&app, &format!("/{key}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.len() as u64, size);
    let payload: WritePayload = serde_json::from_slice(&body).unwrap();
    assert!(payload.ts > 0);

    let (status, _, body) = get(&app, "/delete").await;
    assert_eq!(status, StatusCode::OK);
    let deleted: Vec<String> = serde_json::from_slice(&body).unwrap();
    assert_eq!(deleted.len(), 5);

    let (status, _, _) = get(&app, &format!("/{key}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_local_backend_missing_key_returns_404() {
    let (app, _bucket, _dir) = local_app().await;

    let (status, _, body) = get(&app, "/missing-key").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(String::from_utf8(body).unwrap(), "key missing-key not found");
}

#[tokio::test]
async fn test_local_backend_delete_three_objects() {
    let (app, bucket, _dir) = local_app().await;
    seed(bucket.as_ref(), &["one", "three", "two"]).await;

    let (status, _, body) = get(&app, "/delete").await;

    assert_eq!(status, StatusCode::OK);
    let deleted: Vec<String> = serde_json::from_slice(&body).unwrap();
    assert_eq!(deleted, vec!["one", "three", "two"]);
    let listing = bucket.list(ListOptions::default()).await.unwrap();
    assert!(listing.objects.is_empty());
}
