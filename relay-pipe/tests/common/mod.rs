#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use relay_blob::{
    BlobError, BlobResult, BlobSink, BlobStore, ByteStream, MemoryBlobStore, ObjectMetadata,
    PartialDisposition, SinkReceipt,
};
use relay_pipe::{
    AssetCatalog, Catalog, CatalogError, Checkpoint, ProgressReporter, SourceError, SourceFactory,
    StreamVariant,
};

pub fn chunks(count: usize, size: usize) -> Vec<Result<Bytes, String>> {
    (0..count)
        .map(|i| Ok(Bytes::from(vec![b'a' + (i % 26) as u8; size])))
        .collect()
}

/// A source stream that replays `script`, optionally pausing between items.
pub fn scripted_stream(script: Vec<Result<Bytes, String>>, pause: Option<Duration>) -> ByteStream {
    Box::pin(async_stream::stream! {
        for item in script {
            if let Some(pause) = pause {
                tokio::time::sleep(pause).await;
            }
            yield item.map_err(io::Error::other);
        }
    })
}

/// A source that never yields.
pub fn stalled_stream() -> ByteStream {
    Box::pin(futures::stream::pending())
}

#[derive(Default)]
pub struct FakeCatalog {
    assets: HashMap<String, AssetCatalog>,
    unavailable: bool,
}

impl FakeCatalog {
    pub fn with_asset(mut self, asset: AssetCatalog) -> Self {
        self.assets.insert(asset.asset_id.clone(), asset);
        self
    }

    pub fn unavailable() -> Self {
        Self {
            assets: HashMap::new(),
            unavailable: true,
        }
    }
}

#[async_trait]
impl Catalog for FakeCatalog {
    async fn list_variants(&self, asset_id: &str) -> Result<AssetCatalog, CatalogError> {
        if self.unavailable {
            return Err(CatalogError::Unavailable("catalog offline".into()));
        }
        self.assets
            .get(asset_id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(asset_id.to_string()))
    }
}

/// Serves a fixed script per variant handle and remembers what was opened.
#[derive(Default)]
pub struct FakeSources {
    scripts: Mutex<HashMap<String, Vec<Result<Bytes, String>>>>,
    pause: Option<Duration>,
    stalled: bool,
    pub opened: Mutex<Vec<String>>,
}

impl FakeSources {
    pub fn with_script(self, handle: &str, script: Vec<Result<Bytes, String>>) -> Self {
        self.scripts.lock().insert(handle.to_string(), script);
        self
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = Some(pause);
        self
    }

    pub fn stalled(mut self) -> Self {
        self.stalled = true;
        self
    }
}

#[async_trait]
impl SourceFactory for FakeSources {
    async fn open(&self, variant: &StreamVariant) -> Result<ByteStream, SourceError> {
        self.opened.lock().push(variant.handle.clone());
        if self.stalled {
            return Ok(stalled_stream());
        }
        let script = self
            .scripts
            .lock()
            .remove(&variant.handle)
            .ok_or_else(|| SourceError::Rejected(variant.handle.clone()))?;
        Ok(scripted_stream(script, self.pause))
    }
}

/// Counters shared between a [`CountingSink`] and the test.
#[derive(Default)]
pub struct SinkCounters {
    pub bytes_written: AtomicU64,
    pub writes: AtomicUsize,
    pub finished: AtomicBool,
    pub aborted: AtomicUsize,
}

/// A sink that can fail after a byte budget, slow down, or fail its abort.
pub struct CountingSink {
    pub counters: Arc<SinkCounters>,
    pub fail_after: Option<u64>,
    pub write_delay: Option<Duration>,
    pub abort_fails: bool,
    closed: bool,
}

impl CountingSink {
    pub fn new(counters: Arc<SinkCounters>) -> Self {
        Self {
            counters,
            fail_after: None,
            write_delay: None,
            abort_fails: false,
            closed: false,
        }
    }

    pub fn failing_after(mut self, bytes: u64) -> Self {
        self.fail_after = Some(bytes);
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    pub fn with_failing_abort(mut self) -> Self {
        self.abort_fails = true;
        self
    }
}

#[async_trait]
impl BlobSink for CountingSink {
    async fn write(&mut self, chunk: Bytes) -> BlobResult<()> {
        if self.closed {
            return Err(BlobError::SinkClosed);
        }
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
        let written = self.counters.bytes_written.load(Ordering::SeqCst);
        if let Some(limit) = self.fail_after {
            if written + chunk.len() as u64 > limit {
                return Err(BlobError::write_failed("quota exceeded"));
            }
        }
        self.counters
            .bytes_written
            .fetch_add(chunk.len() as u64, Ordering::SeqCst);
        self.counters.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn finish(&mut self) -> BlobResult<SinkReceipt> {
        if self.closed {
            return Err(BlobError::SinkClosed);
        }
        self.closed = true;
        self.counters.finished.store(true, Ordering::SeqCst);
        Ok(SinkReceipt::new(
            "counting",
            self.counters.bytes_written.load(Ordering::SeqCst),
        ))
    }

    async fn abort(&mut self) -> BlobResult<PartialDisposition> {
        self.counters.aborted.fetch_add(1, Ordering::SeqCst);
        if self.abort_fails {
            return Err(BlobError::write_failed("abort rejected"));
        }
        self.closed = true;
        Ok(PartialDisposition::RolledBack)
    }
}

/// Memory store that counts finalization calls and can fail them.
#[derive(Clone, Default)]
pub struct CountingStore {
    pub inner: MemoryBlobStore,
    pub make_public_calls: Arc<AtomicUsize>,
    pub metadata_calls: Arc<AtomicUsize>,
    pub fail_make_public: bool,
    pub make_public_delay: Option<Duration>,
    pub drop_size: bool,
    pub fail_writes_after: Option<u64>,
}

#[async_trait]
impl BlobStore for CountingStore {
    async fn create_write_sink(
        &self,
        key: &str,
        content_type: &str,
    ) -> BlobResult<Box<dyn BlobSink>> {
        match self.fail_writes_after {
            Some(limit) => Ok(Box::new(
                CountingSink::new(Arc::new(SinkCounters::default())).failing_after(limit),
            )),
            None => self.inner.create_write_sink(key, content_type).await,
        }
    }

    async fn make_public(&self, key: &str) -> BlobResult<()> {
        self.make_public_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.make_public_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_make_public {
            return Err(BlobError::invalid("acl update denied"));
        }
        self.inner.make_public(key).await
    }

    fn public_url(&self, key: &str) -> String {
        self.inner.public_url(key)
    }

    async fn metadata(&self, key: &str) -> BlobResult<ObjectMetadata> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        let mut metadata = self.inner.metadata(key).await?;
        if self.drop_size {
            metadata.size = None;
        }
        Ok(metadata)
    }

    fn backend(&self) -> &'static str {
        "counting"
    }
}

#[derive(Clone, Default)]
pub struct CollectingReporter {
    pub seen: Arc<Mutex<Vec<Checkpoint>>>,
}

impl ProgressReporter for CollectingReporter {
    fn on_checkpoint(&self, checkpoint: &Checkpoint) -> anyhow::Result<()> {
        self.seen.lock().push(*checkpoint);
        Ok(())
    }
}

pub struct FailingReporter;

impl ProgressReporter for FailingReporter {
    fn on_checkpoint(&self, _checkpoint: &Checkpoint) -> anyhow::Result<()> {
        anyhow::bail!("reporter offline")
    }
}
