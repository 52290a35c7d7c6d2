//! Progress checkpoints for a relay.
//!
//! A transfer with a known expected length reports five checkpoints, at
//! 20%, 40%, 60%, 80% and 100% of the expected bytes. Reporting is purely
//! observational: a reporter that fails never affects the transfer.

use tracing::info;

/// Number of checkpoints per transfer.
pub const CHECKPOINT_COUNT: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    /// 1-based, at most [`CHECKPOINT_COUNT`]
    pub index: u64,
    pub bytes_so_far: u64,
    pub expected_total: u64,
}

impl Checkpoint {
    pub fn percent(&self) -> u64 {
        self.index * 100 / CHECKPOINT_COUNT
    }
}

pub trait ProgressReporter: Send + Sync {
    fn on_checkpoint(&self, checkpoint: &Checkpoint) -> anyhow::Result<()>;
}

/// Logs each checkpoint at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn on_checkpoint(&self, checkpoint: &Checkpoint) -> anyhow::Result<()> {
        info!(
            checkpoint = checkpoint.index,
            percent = checkpoint.percent(),
            bytes = checkpoint.bytes_so_far,
            expected = checkpoint.expected_total,
            "Received {} bytes of audio data out of {} bytes total",
            checkpoint.bytes_so_far,
            checkpoint.expected_total
        );
        Ok(())
    }
}

/// Decides when a running byte count crosses the next threshold.
#[derive(Debug, Clone)]
pub struct CheckpointTracker {
    expected: Option<u64>,
    next_index: u64,
}

impl CheckpointTracker {
    /// An absent or zero expected length disables checkpoints.
    pub fn new(expected: Option<u64>) -> Self {
        Self {
            expected: expected.filter(|total| *total > 0),
            next_index: 1,
        }
    }

    fn threshold(expected: u64, index: u64) -> u64 {
        // ceil(expected * index / 5) without overflow
        let scaled = expected as u128 * index as u128;
        scaled.div_ceil(CHECKPOINT_COUNT as u128) as u64
    }

    /// Feed the running total; returns the checkpoint to report, if any.
    ///
    /// A chunk that crosses several thresholds at once yields a single
    /// checkpoint carrying the highest index crossed.
    pub fn advance(&mut self, total: u64) -> Option<Checkpoint> {
        let expected = self.expected?;
        if self.next_index > CHECKPOINT_COUNT
            || total < Self::threshold(expected, self.next_index)
        {
            return None;
        }

        let mut index = self.next_index;
        while index < CHECKPOINT_COUNT && total >= Self::threshold(expected, index + 1) {
            index += 1;
        }
        self.next_index = index + 1;

        Some(Checkpoint {
            index,
            bytes_so_far: total,
            expected_total: expected,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.expected.is_some()
    }
}
