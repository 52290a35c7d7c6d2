//! Request coordination: preconditions, selection, relay, finalization.

use std::sync::Arc;
use std::time::Duration;

use relay_blob::BlobAdapter;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::finalizer::Finalizer;
use crate::response::{Reply, ResponseState};
use crate::selector::{select, SelectionPolicy};
use crate::source::{Catalog, CatalogError, SourceFactory};
use crate::{RelayPipeline, TransferError, TransferOutcome};

/// A transfer request as the transport layer saw it.
#[derive(Debug, Clone, Default)]
pub struct TransferRequest {
    pub method: String,
    pub api_key: Option<String>,
    pub asset_id: Option<String>,
}

impl TransferRequest {
    pub fn new<M: Into<String>>(method: M) -> Self {
        Self {
            method: method.into(),
            ..Self::default()
        }
    }

    /// A POST for `asset_id`.
    pub fn post<S: Into<String>>(asset_id: S) -> Self {
        Self::new("POST").with_asset_id(asset_id)
    }

    pub fn with_api_key<S: Into<String>>(mut self, key: S) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_asset_id<S: Into<String>>(mut self, asset_id: S) -> Self {
        self.asset_id = Some(asset_id.into());
        self
    }
}

/// Success body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferPayload {
    pub audio_url: String,
    /// `audio/<container>` or `video/<container>`
    #[serde(rename = "type")]
    pub media_type: String,
    pub length_seconds: Option<u64>,
    /// Size the storage backend reports
    pub file_size: u64,
    /// Bytes the relay moved
    pub transferred_bytes: u64,
}

#[derive(Debug, Clone, Default)]
pub struct CoordinatorConfig {
    /// Shared secret callers present; `None` accepts every caller
    pub api_key: Option<String>,
    pub policy: SelectionPolicy,
    /// Cancel the transfer after this long
    pub request_timeout: Option<Duration>,
}

impl CoordinatorConfig {
    pub fn with_api_key<S: Into<String>>(mut self, key: S) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_policy(mut self, policy: SelectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}

/// Drives one transfer request to exactly one reply.
///
/// Collaborators are injected so the whole flow runs against in-memory
/// doubles in tests.
#[derive(Clone)]
pub struct RequestCoordinator {
    catalog: Arc<dyn Catalog>,
    sources: Arc<dyn SourceFactory>,
    blobs: BlobAdapter,
    pipeline: RelayPipeline,
    finalizer: Finalizer,
    config: CoordinatorConfig,
}

impl RequestCoordinator {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        sources: Arc<dyn SourceFactory>,
        blobs: BlobAdapter,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            catalog,
            sources,
            finalizer: Finalizer::new(blobs.clone()),
            blobs,
            pipeline: RelayPipeline::default(),
            config,
        }
    }

    pub fn with_pipeline(mut self, pipeline: RelayPipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Run `request` and answer through `state`.
    ///
    /// Whatever happens, `state` receives exactly one reply. Cancelling
    /// `token` stops the relay, aborts the sink and skips finalization.
    #[instrument(skip_all, fields(asset_id = ?request.asset_id, method = %request.method))]
    pub async fn handle(
        &self,
        request: TransferRequest,
        state: Arc<ResponseState>,
        token: CancellationToken,
    ) {
        let reply = match self.check_preconditions(&request) {
            Err(err) => Err(err),
            Ok(asset_id) => {
                let timer = self.arm_timeout(&state, &token);
                let reply = self.execute(asset_id, &state, &token).await;
                if let Some(timer) = timer {
                    timer.abort();
                }
                reply
            }
        };

        match &reply {
            Ok(payload) => info!(
                url = %payload.audio_url,
                file_size = payload.file_size,
                "transfer complete"
            ),
            Err(err) if err.kind().status_code() >= 500 => error!(error = %err, "transfer failed"),
            Err(err) => warn!(error = %err, "transfer rejected"),
        }

        state.respond(reply);
    }

    fn arm_timeout(
        &self,
        state: &Arc<ResponseState>,
        token: &CancellationToken,
    ) -> Option<JoinHandle<()>> {
        let limit = self.config.request_timeout?;
        let state = Arc::clone(state);
        let token = token.clone();

        Some(tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(limit) => {
                    warn!(?limit, "request timed out; cancelling transfer");
                    // Answer first so the caller is not kept waiting on cleanup
                    state.respond(Err(TransferError::Cancelled));
                    token.cancel();
                }
            }
        }))
    }

    fn check_preconditions(&self, request: &TransferRequest) -> Result<String, TransferError> {
        if let Some(expected) = &self.config.api_key {
            if request.api_key.as_deref() != Some(expected.as_str()) {
                return Err(TransferError::Unauthorized);
            }
        }

        if !request.method.eq_ignore_ascii_case("POST") {
            return Err(TransferError::MethodNotAllowed {
                method: request.method.clone(),
            });
        }

        request
            .asset_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or(TransferError::MissingAssetId)
    }

    async fn execute(
        &self,
        asset_id: String,
        state: &ResponseState,
        token: &CancellationToken,
    ) -> Reply {
        let catalog = self
            .catalog
            .list_variants(&asset_id)
            .await
            .map_err(|err| match err {
                CatalogError::NotFound(_) => TransferError::NotFound {
                    asset_id: asset_id.clone(),
                    kind: self.config.policy.kind,
                },
                CatalogError::Unavailable(cause) => TransferError::Catalog(cause),
            })?;

        let variant =
            select(&catalog.variants, &self.config.policy).map_err(|_| TransferError::NotFound {
                asset_id: asset_id.clone(),
                kind: self.config.policy.kind,
            })?;

        info!(
            title = ?catalog.title,
            container = %variant.container,
            mime_type = %variant.mime_type,
            bitrate = ?variant.bitrate,
            content_length = ?variant.content_length,
            "selected variant"
        );

        let source = self
            .sources
            .open(&variant)
            .await
            .map_err(|err| TransferError::SourceOpen(err.to_string()))?;

        let (handle, sink) = self
            .blobs
            .open_sink(&asset_id, &variant.container, &variant.mime_type)
            .await
            .map_err(TransferError::SinkOpen)?;

        if token.is_cancelled() || state.is_sent() {
            return Err(TransferError::Cancelled);
        }

        let bytes_transferred = match self.pipeline.run(&variant, source, sink, token).await {
            TransferOutcome::Success {
                bytes_transferred, ..
            } => bytes_transferred,
            TransferOutcome::Failure {
                cancelled: true, ..
            } => return Err(TransferError::Cancelled),
            TransferOutcome::Failure {
                stage,
                cause,
                bytes_transferred,
                ..
            } => {
                return Err(TransferError::Relay {
                    stage,
                    cause,
                    bytes_transferred,
                })
            }
        };

        // A reply may already be out (timeout); do not publish behind it
        if token.is_cancelled() || state.is_sent() {
            return Err(TransferError::Cancelled);
        }

        let finalized = match self.finalizer.finalize(&handle, token).await {
            Ok(finalized) => finalized,
            Err(err) if err.cancelled => return Err(TransferError::Cancelled),
            Err(err) => return Err(err.into()),
        };
        info!(
            key = %handle.key(),
            bitrate = ?variant.bitrate,
            size = finalized.size,
            "published"
        );

        Ok(TransferPayload {
            audio_url: finalized.public_url,
            media_type: format!("{}/{}", variant.media_family(), variant.container),
            length_seconds: catalog.length_seconds,
            file_size: finalized.size,
            transferred_bytes: bytes_transferred,
        })
    }
}
