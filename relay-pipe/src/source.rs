use async_trait::async_trait;
use relay_blob::ByteStream;
use thiserror::Error;

use crate::{AssetCatalog, StreamVariant};

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Asset not found: {0}")]
    NotFound(String),

    #[error("Catalog unavailable: {0}")]
    Unavailable(String),
}

/// Enumerates the variants of an asset
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn list_variants(&self, asset_id: &str) -> Result<AssetCatalog, CatalogError>;
}

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Source rejected variant: {0}")]
    Rejected(String),

    #[error("Source unavailable: {0}")]
    Unavailable(String),
}

/// Opens the byte stream behind a variant handle.
///
/// The stream is finite, forward-only and not restartable; it ends with
/// `None` or an `Err` item.
#[async_trait]
pub trait SourceFactory: Send + Sync {
    async fn open(&self, variant: &StreamVariant) -> Result<ByteStream, SourceError>;
}
