use async_trait::async_trait;
use bytes::Bytes;

use crate::{BlobResult, ObjectMetadata, PartialDisposition, SinkReceipt};

/// Core storage operations - must be implemented by all storage backends
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Open a write sink for a new object
    async fn create_write_sink(
        &self,
        key: &str,
        content_type: &str,
    ) -> BlobResult<Box<dyn BlobSink>>;

    /// Make a stored object publicly retrievable
    async fn make_public(&self, key: &str) -> BlobResult<()>;

    /// Public URL an object is served from once it is public
    fn public_url(&self, key: &str) -> String;

    /// Confirmed metadata for a stored object
    async fn metadata(&self, key: &str) -> BlobResult<ObjectMetadata>;

    /// Short backend name for logs
    fn backend(&self) -> &'static str;
}

/// Write half of a storage object.
///
/// A sink reaches exactly one terminal state: `finish` (flush complete) or
/// `abort`. Calls after a terminal state return [`BlobError::SinkClosed`].
///
/// [`BlobError::SinkClosed`]: crate::BlobError::SinkClosed
#[async_trait]
pub trait BlobSink: Send {
    /// Append a chunk
    async fn write(&mut self, chunk: Bytes) -> BlobResult<()>;

    /// Flush everything written so far and commit the object
    async fn finish(&mut self) -> BlobResult<SinkReceipt>;

    /// Stop writing and report what happened to the partial data
    async fn abort(&mut self) -> BlobResult<PartialDisposition>;
}

/// Strategy for naming relayed objects
pub trait BlobKeyStrategy: Send + Sync {
    /// Generate a key for an asset stored with the given file extension
    fn object_key(&self, asset_id: &str, extension: &str) -> String;
}

/// Default key strategy: `{asset_id}.{extension}`
#[derive(Debug, Clone)]
pub struct DefaultKeyStrategy;

impl BlobKeyStrategy for DefaultKeyStrategy {
    fn object_key(&self, asset_id: &str, extension: &str) -> String {
        file_name(asset_id, extension)
    }
}

/// Key strategy placing every object under a fixed prefix: `{prefix}/{asset_id}.{extension}`
#[derive(Debug, Clone)]
pub struct PrefixedKeyStrategy {
    prefix: String,
}

impl PrefixedKeyStrategy {
    pub fn new<S: Into<String>>(prefix: S) -> Self {
        let prefix: String = prefix.into();
        let prefix = prefix
            .split('/')
            .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
            .collect::<Vec<_>>()
            .join("/");
        Self { prefix }
    }
}

impl BlobKeyStrategy for PrefixedKeyStrategy {
    fn object_key(&self, asset_id: &str, extension: &str) -> String {
        if self.prefix.is_empty() {
            return file_name(asset_id, extension);
        }
        format!("{}/{}", self.prefix, file_name(asset_id, extension))
    }
}

fn file_name(asset_id: &str, extension: &str) -> String {
    let stem = sanitize_segment(asset_id);
    let extension = sanitize_segment(extension.trim_start_matches('.'));
    if extension.is_empty() {
        stem
    } else {
        format!("{}.{}", stem, extension)
    }
}

/// Keys must not contain `/`, `..` or other path syntax coming from callers.
fn sanitize_segment(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
