use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::{
    BlobConfig, BlobError, BlobKeyStrategy, BlobResult, BlobSink, BlobStore, DefaultKeyStrategy,
    ObjectMetadata, PartialDisposition, SinkHandle, SinkReceipt,
};

/// The storage facade the relay talks to.
///
/// Wraps a [`BlobStore`] with object naming, size guarding and public URL
/// overrides so backends stay small.
#[derive(Clone)]
pub struct BlobAdapter {
    store: Arc<dyn BlobStore>,
    keys: Arc<dyn BlobKeyStrategy>,
    config: BlobConfig,
}

impl BlobAdapter {
    /// Create a new blob adapter
    pub fn new<S: BlobStore + 'static>(store: S, config: BlobConfig) -> Self {
        Self::from_arc(Arc::new(store), config)
    }

    /// Create from a shared store
    pub fn from_arc(store: Arc<dyn BlobStore>, config: BlobConfig) -> Self {
        Self {
            store,
            keys: Arc::new(DefaultKeyStrategy),
            config,
        }
    }

    /// Replace the key strategy
    pub fn with_key_strategy<K: BlobKeyStrategy + 'static>(mut self, keys: K) -> Self {
        self.keys = Arc::new(keys);
        self
    }

    /// Open a sink for an asset's relayed object
    pub async fn open_sink(
        &self,
        asset_id: &str,
        extension: &str,
        content_type: &str,
    ) -> BlobResult<(SinkHandle, Box<dyn BlobSink>)> {
        if asset_id.trim().is_empty() {
            return Err(BlobError::invalid("asset id must not be empty"));
        }

        let key = self.keys.object_key(asset_id, extension);
        let inner = self.store.create_write_sink(&key, content_type).await?;
        let sink = LimitedSink {
            inner,
            written: 0,
            max: self.config.max_blob_bytes,
        };

        Ok((SinkHandle::new(key, content_type), Box::new(sink)))
    }

    /// Make the object publicly retrievable
    pub async fn make_public(&self, handle: &SinkHandle) -> BlobResult<()> {
        self.store.make_public(handle.key()).await
    }

    /// Public URL for the object
    pub fn public_url(&self, handle: &SinkHandle) -> String {
        match &self.config.public_base_url {
            Some(base) => format!("{}/{}", base, handle.key()),
            None => self.store.public_url(handle.key()),
        }
    }

    /// Confirmed metadata for the object
    pub async fn metadata(&self, handle: &SinkHandle) -> BlobResult<ObjectMetadata> {
        self.store.metadata(handle.key()).await
    }

    /// Backend name of the wrapped store
    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }
}

/// Enforces `max_blob_bytes` in front of a backend sink.
struct LimitedSink {
    inner: Box<dyn BlobSink>,
    written: u64,
    max: u64,
}

#[async_trait]
impl BlobSink for LimitedSink {
    async fn write(&mut self, chunk: Bytes) -> BlobResult<()> {
        let size = self.written + chunk.len() as u64;
        if size > self.max {
            return Err(BlobError::TooLarge {
                size,
                max: self.max,
            });
        }
        self.inner.write(chunk).await?;
        self.written = size;
        Ok(())
    }

    async fn finish(&mut self) -> BlobResult<SinkReceipt> {
        self.inner.finish().await
    }

    async fn abort(&mut self) -> BlobResult<PartialDisposition> {
        self.inner.abort().await
    }
}
