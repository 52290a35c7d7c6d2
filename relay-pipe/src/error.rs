use relay_blob::BlobError;
use relay_core::{ErrorKind, RelayError};
use serde_json::json;
use thiserror::Error;

use crate::finalizer::{FinalizationError, FinalizeStage};
use crate::{MediaKind, TransferStage};

/// Everything that can end a transfer request without a payload.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Method {method} not allowed")]
    MethodNotAllowed { method: String },

    #[error("Missing asset id")]
    MissingAssetId,

    #[error("No {kind} formats available for asset {asset_id}")]
    NotFound { asset_id: String, kind: MediaKind },

    #[error("Catalog lookup failed: {0}")]
    Catalog(String),

    #[error("Could not open source stream: {0}")]
    SourceOpen(String),

    #[error("Could not open storage sink: {0}")]
    SinkOpen(#[source] BlobError),

    #[error("Relay failed at {stage} stage after {bytes_transferred} bytes: {cause}")]
    Relay {
        stage: TransferStage,
        cause: String,
        bytes_transferred: u64,
    },

    #[error("Transfer cancelled")]
    Cancelled,

    #[error(transparent)]
    Finalization(#[from] FinalizationError),
}

impl TransferError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransferError::Unauthorized => ErrorKind::NotAuthenticated,
            TransferError::MethodNotAllowed { .. } => ErrorKind::MethodNotAllowed,
            TransferError::MissingAssetId => ErrorKind::BadRequest,
            TransferError::NotFound { .. } => ErrorKind::NotFound,
            _ => ErrorKind::GeneralError,
        }
    }

    /// Message safe to show to the caller. Internal causes stay in the logs.
    pub fn client_message(&self) -> String {
        match self {
            TransferError::Unauthorized => "Unauthorized".to_string(),
            TransferError::MethodNotAllowed { .. } => "Method Not Allowed".to_string(),
            TransferError::MissingAssetId => "Missing videoId".to_string(),
            TransferError::NotFound { kind, .. } => match kind {
                MediaKind::AudioOnly => "No audio formats available for this video".to_string(),
                other => format!("No {} formats available for this video", other),
            },
            TransferError::Relay { stage, .. } => match stage {
                TransferStage::Sink => "Error uploading audio".to_string(),
                TransferStage::Source | TransferStage::Both => "Error in audio stream".to_string(),
            },
            TransferError::Finalization(err) => match err.stage {
                FinalizeStage::Visibility => "Error making file public".to_string(),
                FinalizeStage::Metadata => "Error getting file metadata".to_string(),
            },
            TransferError::Cancelled => "Request cancelled".to_string(),
            _ => "Internal Server Error".to_string(),
        }
    }

    /// Failing stage, for errors that have one.
    pub fn stage(&self) -> Option<String> {
        match self {
            TransferError::Relay { stage, .. } => Some(stage.to_string()),
            TransferError::Finalization(err) => Some(err.stage.to_string()),
            _ => None,
        }
    }

    pub fn into_relay_error(self) -> RelayError {
        let mut relay = RelayError::new(self.kind(), self.client_message());
        if let Some(stage) = self.stage() {
            relay = relay.with_data(json!({ "stage": stage }));
        }
        relay.with_source(anyhow::Error::new(self))
    }
}

impl From<TransferError> for RelayError {
    fn from(err: TransferError) -> Self {
        err.into_relay_error()
    }
}
