use bytes::Bytes;
use futures_core::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// Stream of bytes for blob content
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Identifies the object a sink writes to.
///
/// Handed from the relay to finalization once the bytes are flushed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SinkHandle {
    pub key: String,
    pub content_type: String,
}

impl SinkHandle {
    pub fn new<K: Into<String>, C: Into<String>>(key: K, content_type: C) -> Self {
        Self {
            key: key.into(),
            content_type: content_type.into(),
        }
    }

    /// Get the object key
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl std::fmt::Display for SinkHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key)
    }
}

/// What happened to the bytes a sink had already accepted when it was aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartialDisposition {
    /// Nothing from this sink is left in storage.
    RolledBack,
    /// The backend kept what it had received; the object is unusable.
    Committed { bytes: u64 },
}
