//! HTTP handlers for the worker.
//! Object bodies are streamed straight from the bucket; listing and delete
//! results are rendered as JSON.

use crate::{
    errors::AppError,
    models::{
        object::ObjectDescriptor,
        payload::{RequestContext, WritePayload},
    },
    routes::routes::Route,
    services::worker_service::{ROOT_LIST_LIMIT, WorkerService},
};
use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;

pub const JSON_CTYPE: &str = "application/json; charset=utf-8";
pub const BINARY_CTYPE: &str = "application/octet-stream";

/// Single entry point for every request; the path picks the behavior.
pub async fn dispatch(
    State(service): State<WorkerService>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let result = match Route::from_path(uri.path()) {
        Route::DeleteBatch => delete_batch(&service).await,
        Route::Fetch(key) => fetch_object(&service, &key).await,
        Route::SeedAndList => {
            let ctx = RequestContext::from_request(&uri, &headers);
            seed_and_list(&service, &ctx).await
        }
    };

    result.unwrap_or_else(|err| err.into_response())
}

/// Delete up to ten objects and reply with their keys.
pub async fn delete_batch(service: &WorkerService) -> Result<Response, AppError> {
    let keys = service.delete_batch().await?;
    json_response(&keys, false)
}

/// Stream one object, or 404 when the key does not exist.
pub async fn fetch_object(service: &WorkerService, key: &str) -> Result<Response, AppError> {
    let Some(object) = service.get_object(key).await? else {
        return Err(AppError::not_found(format!("key {} not found", key)));
    };

    let mut response = Response::new(Body::from_stream(object.body));
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &object.descriptor);
    Ok(response)
}

/// Write `seed_writes` payloads in order, then reply with the bucket listing.
///
/// The first failed write aborts the rest.
pub async fn seed_and_list(
    service: &WorkerService,
    ctx: &RequestContext,
) -> Result<Response, AppError> {
    for seq in 0..service.seed_writes {
        service
            .write_object(&WritePayload::from_context(ctx, seq))
            .await?;
    }

    let listing = service.list_objects(ROOT_LIST_LIMIT).await?;
    json_response(&listing, true)
}

fn json_response<T: Serialize>(value: &T, pretty: bool) -> Result<Response, AppError> {
    let body = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|err| AppError::internal(format!("failed to encode response: {}", err)))?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, HeaderValue::from_static(JSON_CTYPE))],
        body,
    )
        .into_response())
}

fn set_object_headers(headers: &mut HeaderMap, meta: &ObjectDescriptor) {
    let content_type = meta
        .http_metadata
        .content_type
        .as_deref()
        .and_then(|v| HeaderValue::from_str(v).ok())
        .unwrap_or_else(|| HeaderValue::from_static(BINARY_CTYPE));
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(meta.size));

    if let Ok(value) = HeaderValue::from_str(&meta.http_etag) {
        headers.insert(header::ETAG, value);
    }
}
