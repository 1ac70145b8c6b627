//! Storage calls made by the worker.
//!
//! Each method wraps exactly one bucket call in a local error boundary: the
//! failure is formatted as `failed to ...`, logged, and handed back as an
//! `AppError` carrying HTTP 500.

use crate::{
    errors::AppError,
    models::{
        object::{ListOptions, ObjectBody, ObjectDescriptor, ObjectListing, PutOptions},
        payload::WritePayload,
    },
    services::bucket::Bucket,
};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// Number of objects removed by a single `/delete` request.
pub const DELETE_BATCH_LIMIT: usize = 10;

/// Number of objects returned by the root listing.
pub const ROOT_LIST_LIMIT: usize = 1000;

/// Shared state handed to every handler and to the scheduler.
#[derive(Clone)]
pub struct WorkerService {
    pub bucket: Arc<dyn Bucket>,

    /// Sequential writes performed by a request to `/`.
    pub seed_writes: u32,
}

impl WorkerService {
    pub fn new(bucket: Arc<dyn Bucket>, seed_writes: u32) -> Self {
        Self {
            bucket,
            seed_writes,
        }
    }

    /// Write `payload` as JSON under a freshly generated key.
    pub async fn write_object(&self, payload: &WritePayload) -> Result<ObjectDescriptor, AppError> {
        let key = Uuid::new_v4().to_string();
        let result = match payload.to_json() {
            Ok(data) => {
                self.bucket
                    .put(&key, Bytes::from(data), PutOptions::default())
                    .await
            }
            Err(err) => Err(err.into()),
        };

        match result {
            Ok(descriptor) => {
                info!("wrote key {} to bucket", key);
                Ok(descriptor)
            }
            Err(err) => Err(fail(format!("failed to write {} to bucket: {}", key, err))),
        }
    }

    pub async fn get_object(&self, key: &str) -> Result<Option<ObjectBody>, AppError> {
        info!("fetching object {}", key);
        self.bucket
            .get(key)
            .await
            .map_err(|err| fail(format!("failed to get object: {}", err)))
    }

    pub async fn list_objects(&self, limit: usize) -> Result<ObjectListing, AppError> {
        self.bucket
            .list(ListOptions::with_limit(limit))
            .await
            .map_err(|err| fail(format!("failed to get list: {}", err)))
    }

    /// Delete the first batch of objects in key order, returning their keys.
    pub async fn delete_batch(&self) -> Result<Vec<String>, AppError> {
        let listing = self
            .bucket
            .list(ListOptions::with_limit(DELETE_BATCH_LIMIT))
            .await
            .map_err(|err| fail(format!("failed to list objects for delete: {}", err)))?;

        let keys = listing.keys();
        if keys.is_empty() {
            return Ok(keys);
        }

        self.bucket
            .delete(&keys)
            .await
            .map_err(|err| fail(format!("failed to delete objects: {}", err)))?;
        info!("deleted {} objects from bucket", keys.len());
        Ok(keys)
    }
}

fn fail(message: String) -> AppError {
    error!("{}", message);
    AppError::internal(message)
}
