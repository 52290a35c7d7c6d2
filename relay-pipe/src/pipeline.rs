//! The relay: source bytes into a storage sink with backpressure.
//!
//! Two legs run concurrently and meet at a channel with a single slot:
//!
//! ```text
//! source ──read──▶ [slot] ──write──▶ sink
//! ```
//!
//! The source leg reserves the slot before it reads, so at most one chunk is
//! ever in flight between a read and the sink accepting it. A slow sink
//! therefore pauses the source rather than growing memory.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use relay_blob::{BlobSink, ByteStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::outcome::{LegLedger, SinkEnd, SourceEnd};
use crate::progress::{Checkpoint, CheckpointTracker, ProgressReporter, TracingReporter};
use crate::{StreamVariant, TransferOutcome};

#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    /// Longest wait for the next source chunk; `None` waits forever
    pub chunk_timeout: Option<Duration>,
}

impl PipelineConfig {
    pub fn with_chunk_timeout(mut self, timeout: Duration) -> Self {
        self.chunk_timeout = Some(timeout);
        self
    }
}

#[derive(Debug)]
enum SourceEvent {
    Chunk(Bytes),
    End,
    Failed(String),
}

#[derive(Clone)]
pub struct RelayPipeline {
    reporter: Arc<dyn ProgressReporter>,
    config: PipelineConfig,
}

impl Default for RelayPipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

impl RelayPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            reporter: Arc::new(TracingReporter),
            config,
        }
    }

    pub fn with_reporter<R: ProgressReporter + 'static>(mut self, reporter: R) -> Self {
        self.reporter = Arc::new(reporter);
        self
    }

    /// Relay `source` into `sink` until one of them reaches a terminal state.
    ///
    /// On success the sink has flushed every byte the source produced. On any
    /// failure, or when `token` is cancelled, the sink is aborted and the
    /// source is dropped; the returned outcome names the failing side.
    #[instrument(skip_all, fields(container = %variant.container, expected = ?variant.expected_length()))]
    pub async fn run(
        &self,
        variant: &StreamVariant,
        source: ByteStream,
        mut sink: Box<dyn BlobSink>,
        token: &CancellationToken,
    ) -> TransferOutcome {
        let (tx, rx) = mpsc::channel::<SourceEvent>(1);
        let ledger = Mutex::new(LegLedger::default());

        let (_, bytes_transferred) = tokio::join!(
            self.source_leg(source, tx, token, &ledger),
            self.sink_leg(rx, sink.as_mut(), variant.expected_length(), token, &ledger),
        );

        let outcome = ledger
            .into_inner()
            .into_outcome(variant, bytes_transferred, token.is_cancelled());

        match &outcome {
            TransferOutcome::Success {
                bytes_transferred, ..
            } => info!(bytes = bytes_transferred, "relay complete"),
            TransferOutcome::Failure {
                stage,
                cause,
                bytes_transferred,
                cancelled,
                partial,
            } => warn!(
                %stage,
                %cause,
                bytes = bytes_transferred,
                cancelled,
                ?partial,
                "relay failed"
            ),
        }

        outcome
    }

    async fn source_leg(
        &self,
        mut source: ByteStream,
        tx: mpsc::Sender<SourceEvent>,
        token: &CancellationToken,
        ledger: &Mutex<LegLedger>,
    ) {
        let end = loop {
            let permit = tokio::select! {
                biased;
                _ = token.cancelled() => break SourceEnd::Cancelled,
                permit = tx.reserve() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break SourceEnd::Detached,
                },
            };

            let next = tokio::select! {
                biased;
                _ = token.cancelled() => break SourceEnd::Cancelled,
                _ = tx.closed() => break SourceEnd::Detached,
                next = self.next_chunk(&mut source) => next,
            };

            match next {
                Ok(Some(chunk)) => {
                    if !chunk.is_empty() {
                        permit.send(SourceEvent::Chunk(chunk));
                    }
                }
                Ok(None) => {
                    permit.send(SourceEvent::End);
                    break SourceEnd::Ended;
                }
                Err(cause) => {
                    permit.send(SourceEvent::Failed(cause.clone()));
                    break SourceEnd::Failed(cause);
                }
            }
        };

        // Release the upstream connection before anything else waits on us
        drop(source);
        debug!(?end, "source leg finished");
        ledger.lock().record_source(end);
    }

    async fn next_chunk(&self, source: &mut ByteStream) -> Result<Option<Bytes>, String> {
        let next = match self.config.chunk_timeout {
            Some(limit) => tokio::time::timeout(limit, source.next())
                .await
                .map_err(|_| format!("no data from source for {:?}", limit))?,
            None => source.next().await,
        };
        next.transpose().map_err(|err| err.to_string())
    }

    async fn sink_leg(
        &self,
        mut rx: mpsc::Receiver<SourceEvent>,
        sink: &mut dyn BlobSink,
        expected: Option<u64>,
        token: &CancellationToken,
        ledger: &Mutex<LegLedger>,
    ) -> u64 {
        let mut tracker = CheckpointTracker::new(expected);
        let mut transferred = 0u64;

        let end = loop {
            let event = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                event = rx.recv() => event,
            };

            match event {
                Some(SourceEvent::Chunk(chunk)) => {
                    let len = chunk.len() as u64;
                    if let Err(err) = sink.write(chunk).await {
                        // Stop the source before cleaning up so no more reads happen
                        rx.close();
                        if let Err(abort_err) = sink.abort().await {
                            debug!(error = %abort_err, "abort after failed write also failed");
                        }
                        break SinkEnd::Failed(err.to_string());
                    }
                    transferred += len;
                    if let Some(checkpoint) = tracker.advance(transferred) {
                        self.report(&checkpoint);
                    }
                }
                Some(SourceEvent::End) => {
                    break match sink.finish().await {
                        Ok(receipt) => SinkEnd::Flushed(receipt),
                        Err(err) => SinkEnd::Failed(err.to_string()),
                    };
                }
                Some(SourceEvent::Failed(cause)) => {
                    ledger.lock().record_source(SourceEnd::Failed(cause));
                    break Self::abort_sink(sink).await;
                }
                // Source gone without an end marker, or cancelled
                None => break Self::abort_sink(sink).await,
            }
        };

        rx.close();
        debug!(?end, bytes = transferred, "sink leg finished");
        ledger.lock().record_sink(end);
        transferred
    }

    async fn abort_sink(sink: &mut dyn BlobSink) -> SinkEnd {
        match sink.abort().await {
            Ok(disposition) => SinkEnd::Aborted(disposition),
            Err(err) => SinkEnd::Failed(format!("abort failed: {}", err)),
        }
    }

    fn report(&self, checkpoint: &Checkpoint) {
        if let Err(err) = self.reporter.on_checkpoint(checkpoint) {
            warn!(error = %err, checkpoint = checkpoint.index, "progress reporter failed");
        }
    }
}
