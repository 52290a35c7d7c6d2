use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};

use crate::{
    BlobError, BlobResult, BlobSink, BlobStore, ObjectMetadata, PartialDisposition, SinkReceipt,
};

#[derive(Debug, Clone)]
struct MemoryObject {
    data: Bytes,
    content_type: String,
    public: bool,
    hash: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// In-process store for development and tests.
///
/// Objects only become visible once their sink finishes; aborted sinks leave
/// nothing behind.
#[derive(Clone)]
pub struct MemoryBlobStore {
    objects: Arc<RwLock<HashMap<String, MemoryObject>>>,
    base_url: String,
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new("memory://relay")
    }
}

impl MemoryBlobStore {
    pub fn new<S: Into<String>>(base_url: S) -> Self {
        let base_url: String = base_url.into();
        Self {
            objects: Arc::new(RwLock::new(HashMap::new())),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Stored bytes for a key
    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.objects.read().get(key).map(|o| o.data.clone())
    }

    /// Whether a key has been made public
    pub fn is_public(&self, key: &str) -> bool {
        self.objects.read().get(key).map_or(false, |o| o.public)
    }

    /// Number of committed objects
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn create_write_sink(
        &self,
        key: &str,
        content_type: &str,
    ) -> BlobResult<Box<dyn BlobSink>> {
        Ok(Box::new(MemorySink {
            objects: Arc::clone(&self.objects),
            key: key.to_string(),
            content_type: content_type.to_string(),
            buffer: BytesMut::new(),
            closed: false,
        }))
    }

    async fn make_public(&self, key: &str) -> BlobResult<()> {
        let mut objects = self.objects.write();
        let object = objects
            .get_mut(key)
            .ok_or_else(|| BlobError::not_found(key))?;
        object.public = true;
        object.updated_at = Utc::now();
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }

    async fn metadata(&self, key: &str) -> BlobResult<ObjectMetadata> {
        let objects = self.objects.read();
        let object = objects.get(key).ok_or_else(|| BlobError::not_found(key))?;

        Ok(ObjectMetadata::new(key)
            .with_size(object.data.len() as u64)
            .with_hash(object.hash.clone())
            .with_content_type(object.content_type.clone())
            .with_timestamps(Some(object.created_at), Some(object.updated_at)))
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

struct MemorySink {
    objects: Arc<RwLock<HashMap<String, MemoryObject>>>,
    key: String,
    content_type: String,
    buffer: BytesMut,
    closed: bool,
}

#[async_trait]
impl BlobSink for MemorySink {
    async fn write(&mut self, chunk: Bytes) -> BlobResult<()> {
        if self.closed {
            return Err(BlobError::SinkClosed);
        }
        self.buffer.extend_from_slice(&chunk);
        Ok(())
    }

    async fn finish(&mut self) -> BlobResult<SinkReceipt> {
        if self.closed {
            return Err(BlobError::SinkClosed);
        }
        self.closed = true;

        let data = std::mem::take(&mut self.buffer).freeze();
        let hash = base64::engine::general_purpose::STANDARD.encode(Sha256::digest(&data));
        let bytes_written = data.len() as u64;
        let now = Utc::now();

        self.objects.write().insert(
            self.key.clone(),
            MemoryObject {
                data,
                content_type: self.content_type.clone(),
                public: false,
                hash: hash.clone(),
                created_at: now,
                updated_at: now,
            },
        );

        Ok(SinkReceipt::new(self.key.clone(), bytes_written).with_etag(hash))
    }

    async fn abort(&mut self) -> BlobResult<PartialDisposition> {
        if self.closed {
            return Err(BlobError::SinkClosed);
        }
        self.closed = true;
        self.buffer.clear();
        Ok(PartialDisposition::RolledBack)
    }
}
