use std::fmt;

use chrono::{DateTime, Utc};
use relay_blob::{BlobAdapter, SinkHandle};
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

/// Finalization steps, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FinalizeStage {
    Visibility,
    Metadata,
}

impl fmt::Display for FinalizeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FinalizeStage::Visibility => "visibility",
            FinalizeStage::Metadata => "metadata",
        })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("finalization failed at {stage} stage: {cause}")]
pub struct FinalizationError {
    pub stage: FinalizeStage,
    pub cause: String,
    /// The step was skipped or interrupted by cancellation
    pub cancelled: bool,
}

impl FinalizationError {
    fn new(stage: FinalizeStage, cause: impl Into<String>) -> Self {
        Self {
            stage,
            cause: cause.into(),
            cancelled: false,
        }
    }

    fn cancelled(stage: FinalizeStage) -> Self {
        Self {
            stage,
            cause: "cancelled".to_string(),
            cancelled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinalizationResult {
    pub public_url: String,
    pub size: u64,
    pub content_type: String,
    pub hash: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Publishes a flushed object and reads back its metadata.
#[derive(Clone)]
pub struct Finalizer {
    blobs: BlobAdapter,
}

impl Finalizer {
    pub fn new(blobs: BlobAdapter) -> Self {
        Self { blobs }
    }

    /// Make the object public, then fetch its metadata.
    ///
    /// Must only be called once the sink reported a successful flush. The
    /// metadata step never runs if visibility fails. Each step races `token`;
    /// once it is cancelled no further step starts and the in-flight one is
    /// dropped.
    #[instrument(skip_all, fields(key = %handle.key()))]
    pub async fn finalize(
        &self,
        handle: &SinkHandle,
        token: &CancellationToken,
    ) -> Result<FinalizationResult, FinalizationError> {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                return Err(FinalizationError::cancelled(FinalizeStage::Visibility))
            }
            res = self.blobs.make_public(handle) => {
                res.map_err(|err| FinalizationError::new(FinalizeStage::Visibility, err.to_string()))?
            }
        }

        let public_url = self.blobs.public_url(handle);

        let metadata = tokio::select! {
            biased;
            _ = token.cancelled() => {
                return Err(FinalizationError::cancelled(FinalizeStage::Metadata))
            }
            res = self.blobs.metadata(handle) => {
                res.map_err(|err| FinalizationError::new(FinalizeStage::Metadata, err.to_string()))?
            }
        };

        let size = metadata.size.ok_or_else(|| {
            FinalizationError::new(FinalizeStage::Metadata, "backend reported no object size")
        })?;

        info!(
            name = %metadata.name,
            bucket = ?metadata.bucket,
            size,
            hash = ?metadata.hash,
            content_type = ?metadata.content_type,
            created = ?metadata.created_at,
            updated = ?metadata.updated_at,
            url = %public_url,
            "file details"
        );

        Ok(FinalizationResult {
            public_url,
            size,
            content_type: metadata
                .content_type
                .unwrap_or_else(|| handle.content_type.clone()),
            hash: metadata.hash,
            created_at: metadata.created_at,
            updated_at: metadata.updated_at,
        })
    }
}
