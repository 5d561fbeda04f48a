//! Recording outbound
//!
//! Captures what a runtime routes and cancels instead of forwarding it.
//! Tests deliver the captured envelopes by hand, which keeps every step of
//! a multi-context exchange visible.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use switchboard_core::{ChannelError, Envelope, TransactionId};
use switchboard_endpoint::{EndpointResult, Outbound};

/// Outbound that records envelopes and cancellations
#[derive(Debug, Default)]
pub struct RecordingOutbound {
    routed: Mutex<Vec<Envelope>>,
    cancelled: Mutex<Vec<TransactionId>>,
    refuse: AtomicBool,
}

impl RecordingOutbound {
    /// Create an accepting outbound
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Drain the routed envelopes
    pub fn take(&self) -> Vec<Envelope> {
        std::mem::take(&mut *self.routed.lock())
    }

    /// Number of routed envelopes not yet taken
    pub fn len(&self) -> usize {
        self.routed.lock().len()
    }

    /// Whether nothing was routed since the last take
    pub fn is_empty(&self) -> bool {
        self.routed.lock().is_empty()
    }

    /// Transactions cancelled so far
    pub fn cancelled(&self) -> Vec<TransactionId> {
        self.cancelled.lock().clone()
    }

    /// Fail every later route with a closed channel
    pub fn refuse(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }
}

impl Outbound for RecordingOutbound {
    fn route(&self, envelope: Envelope) -> EndpointResult<()> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(ChannelError::Closed.into());
        }
        self.routed.lock().push(envelope);
        Ok(())
    }

    fn cancel(&self, transaction_id: TransactionId) -> EndpointResult<()> {
        self.cancelled.lock().push(transaction_id);
        Ok(())
    }
}
