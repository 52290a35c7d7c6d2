use std::fmt;

use relay_blob::{PartialDisposition, SinkReceipt};
use serde::Serialize;
use tracing::debug;

use crate::StreamVariant;

/// Which side of the relay failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStage {
    Source,
    Sink,
    Both,
}

impl fmt::Display for TransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransferStage::Source => "source",
            TransferStage::Sink => "sink",
            TransferStage::Both => "both",
        })
    }
}

/// Result of one relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Success {
        bytes_transferred: u64,
        variant: StreamVariant,
        receipt: SinkReceipt,
    },
    Failure {
        stage: TransferStage,
        cause: String,
        /// Bytes the sink accepted before the relay stopped
        bytes_transferred: u64,
        cancelled: bool,
        /// What happened to the partial object, when the sink was aborted
        partial: Option<PartialDisposition>,
    },
}

impl TransferOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TransferOutcome::Success { .. })
    }

    pub fn bytes_transferred(&self) -> u64 {
        match self {
            TransferOutcome::Success {
                bytes_transferred, ..
            }
            | TransferOutcome::Failure {
                bytes_transferred, ..
            } => *bytes_transferred,
        }
    }
}

/// How the source leg ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SourceEnd {
    /// Stream reported its end and the end was handed to the sink
    Ended,
    Failed(String),
    /// The sink stopped listening
    Detached,
    Cancelled,
}

/// How the sink leg ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SinkEnd {
    Flushed(SinkReceipt),
    Failed(String),
    Aborted(PartialDisposition),
}

/// Terminal states of both legs. The first report per leg wins.
#[derive(Debug, Default)]
pub(crate) struct LegLedger {
    source: Option<SourceEnd>,
    sink: Option<SinkEnd>,
}

impl LegLedger {
    pub(crate) fn record_source(&mut self, end: SourceEnd) -> bool {
        if let Some(existing) = &self.source {
            debug!(?existing, ignored = ?end, "source leg already terminal");
            return false;
        }
        self.source = Some(end);
        true
    }

    pub(crate) fn record_sink(&mut self, end: SinkEnd) -> bool {
        if let Some(existing) = &self.sink {
            debug!(?existing, ignored = ?end, "sink leg already terminal");
            return false;
        }
        self.sink = Some(end);
        true
    }

    pub(crate) fn into_outcome(
        self,
        variant: &StreamVariant,
        bytes_transferred: u64,
        cancelled: bool,
    ) -> TransferOutcome {
        if !cancelled {
            if let (Some(SourceEnd::Ended), Some(SinkEnd::Flushed(receipt))) =
                (&self.source, &self.sink)
            {
                return TransferOutcome::Success {
                    bytes_transferred,
                    variant: variant.clone(),
                    receipt: receipt.clone(),
                };
            }
        }

        let partial = match &self.sink {
            Some(SinkEnd::Aborted(disposition)) => Some(*disposition),
            _ => None,
        };

        let cancelled = cancelled || matches!(self.source, Some(SourceEnd::Cancelled));
        if cancelled {
            return TransferOutcome::Failure {
                stage: TransferStage::Both,
                cause: "cancelled".to_string(),
                bytes_transferred,
                cancelled: true,
                partial,
            };
        }

        let source_cause = match self.source {
            Some(SourceEnd::Failed(cause)) => Some(cause),
            _ => None,
        };
        let sink_cause = match self.sink {
            Some(SinkEnd::Failed(cause)) => Some(cause),
            _ => None,
        };

        let (stage, cause) = match (source_cause, sink_cause) {
            (Some(source), Some(sink)) => (
                TransferStage::Both,
                format!("source: {}; sink: {}", source, sink),
            ),
            (Some(source), None) => (TransferStage::Source, source),
            (None, Some(sink)) => (TransferStage::Sink, sink),
            (None, None) => (
                TransferStage::Both,
                "relay stopped before the sink flushed".to_string(),
            ),
        };

        TransferOutcome::Failure {
            stage,
            cause,
            bytes_transferred,
            cancelled: false,
            partial,
        }
    }
}
