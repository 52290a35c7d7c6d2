//! One request, one response.
//!
//! Several tasks may race to answer the same request: the main pipeline,
//! the request timer, a failing leg. [`ResponseState::respond`] lets exactly
//! one of them through; every later attempt is a logged no-op.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use crate::{TransferError, TransferPayload};

pub type Reply = Result<TransferPayload, TransferError>;

#[derive(Debug)]
pub struct ResponseState {
    sent: AtomicBool,
    tx: Mutex<Option<oneshot::Sender<Reply>>>,
}

impl ResponseState {
    /// A fresh state and the receiver its single reply goes to.
    pub fn channel() -> (Self, oneshot::Receiver<Reply>) {
        let (tx, rx) = oneshot::channel();
        let state = Self {
            sent: AtomicBool::new(false),
            tx: Mutex::new(Some(tx)),
        };
        (state, rx)
    }

    pub fn is_sent(&self) -> bool {
        self.sent.load(Ordering::Acquire)
    }

    /// Send `reply` unless something already answered.
    ///
    /// Returns `true` only for the call that won.
    pub fn respond(&self, reply: Reply) -> bool {
        if self
            .sent
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(ok = reply.is_ok(), "response already sent; dropping reply");
            return false;
        }

        if let Some(tx) = self.tx.lock().take() {
            if tx.send(reply).is_err() {
                debug!("requester went away before the reply");
            }
        }
        true
    }
}
