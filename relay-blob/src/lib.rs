//! # relay-blob: storage sinks for relayed media
//!
//! `relay-blob` is the storage side of the relay. It hands out write sinks
//! that accept a stream of chunks, and answers the questions finalization
//! asks afterwards: make the object public, where is it served from, and what
//! does the backend say about it.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   relay-pipe    │  ← moves bytes, decides outcomes
//! ├─────────────────┤
//! │   BlobAdapter   │  ← naming, size guard, URL overrides
//! ├─────────────────┤
//! │   BlobStore     │  ← storage primitives (S3, memory)
//! └─────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use relay_blob::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> BlobResult<()> {
//! let adapter = BlobAdapter::new(MemoryBlobStore::default(), BlobConfig::default());
//!
//! let (handle, mut sink) = adapter.open_sink("abc123", "webm", "audio/webm").await?;
//! sink.write(bytes::Bytes::from_static(b"hello")).await?;
//! let receipt = sink.finish().await?;
//! assert_eq!(receipt.bytes_written, 5);
//!
//! adapter.make_public(&handle).await?;
//! let metadata = adapter.metadata(&handle).await?;
//! assert_eq!(metadata.size, Some(5));
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod config;
mod error;
mod memory_store;
mod receipt;
mod s3_store;
pub mod store;
mod types;

// Re-export main types for clean API
pub use adapter::BlobAdapter;
pub use config::BlobConfig;
pub use error::{BlobError, BlobResult};
pub use memory_store::MemoryBlobStore;
pub use receipt::{ObjectMetadata, SinkReceipt};
pub use s3_store::{S3CompatibleStore, S3Config};
pub use store::{BlobKeyStrategy, BlobSink, BlobStore, DefaultKeyStrategy, PrefixedKeyStrategy};
pub use types::{ByteStream, PartialDisposition, SinkHandle};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        BlobAdapter, BlobConfig, BlobError, BlobResult, BlobSink, BlobStore, ByteStream,
        MemoryBlobStore, SinkHandle,
    };
}
