//! In-memory bucket. Nothing survives a restart.

use crate::{
    models::object::{ListOptions, ObjectBody, ObjectDescriptor, ObjectListing, PutOptions},
    services::bucket::{Bucket, StorageResult, encode_cursor, validate_key},
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::{StreamExt, stream};
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Default)]
pub struct MemoryBucket {
    objects: RwLock<BTreeMap<String, (ObjectDescriptor, Bytes)>>,
}

impl MemoryBucket {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl Bucket for MemoryBucket {
    async fn put(
        &self,
        key: &str,
        value: Bytes,
        opts: PutOptions,
    ) -> StorageResult<ObjectDescriptor> {
        validate_key(key)?;
        let etag = format!("{:x}", md5::compute(&value));
        let descriptor = ObjectDescriptor::new(
            key,
            value.len() as u64,
            etag,
            opts.content_type,
            Utc::now(),
        );

        self.objects
            .write()
            .await
            .insert(key.to_string(), (descriptor.clone(), value));
        Ok(descriptor)
    }

    async fn get(&self, key: &str) -> StorageResult<Option<ObjectBody>> {
        let objects = self.objects.read().await;
        Ok(objects.get(key).map(|(descriptor, value)| ObjectBody {
            descriptor: descriptor.clone(),
            body: stream::once(futures::future::ready(Ok(value.clone()))).boxed(),
        }))
    }

    async fn list(&self, opts: ListOptions) -> StorageResult<ObjectListing> {
        let limit = opts.effective_limit();
        let objects = self.objects.read().await;

        let mut matched: Vec<ObjectDescriptor> = objects
            .values()
            .take(limit + 1)
            .map(|(descriptor, _)| descriptor.clone())
            .collect();

        let truncated = matched.len() > limit;
        matched.truncate(limit);
        let cursor = if truncated {
            matched.last().map(|o| encode_cursor(&o.key))
        } else {
            None
        };

        Ok(ObjectListing {
            objects: matched,
            truncated,
            cursor,
        })
    }

    async fn delete(&self, keys: &[String]) -> StorageResult<()> {
        let mut objects = self.objects.write().await;
        for key in keys {
            if objects.remove(key).is_none() {
                debug!("key {} already missing", key);
            }
        }
        Ok(())
    }
}
