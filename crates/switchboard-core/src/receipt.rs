//! Delivery receipts and the pending delivery log
//!
//! A [`DeliveryReceipt`] records that a request reached a specific session and
//! is waiting for its reply. The hub keeps one log for every request it has
//! delivered; spokes keep one for the requests they sent, so they can hand
//! it back to the hub in a sync snapshot after reconnecting.

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::envelope::{Envelope, MessageId};
use crate::fingerprint::Fingerprint;

/// The sending side of a receipt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptSender {
    /// Resolved sender address
    pub address: Address,
    /// Sender session at delivery time; absent if the sender was not registered
    pub fingerprint: Option<Fingerprint>,
}

/// A delivered request awaiting its reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    /// The delivered request
    #[serde(rename = "message")]
    pub envelope: Envelope,
    /// Session the request was delivered to
    pub to: Fingerprint,
    /// Who is waiting for the reply
    pub from: ReceiptSender,
}

impl DeliveryReceipt {
    /// Message id of the receipted request
    pub fn message_id(&self) -> MessageId {
        self.envelope.message_id
    }
}

/// Ledger of in-flight request receipts, at most one per message id.
#[derive(Debug, Clone, Default)]
pub struct PendingDeliveryLog {
    entries: Vec<DeliveryReceipt>,
}

impl PendingDeliveryLog {
    /// Empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit receipts; a receipt for a message id already present is ignored.
    ///
    /// Returns how many receipts were admitted.
    pub fn add(&mut self, receipts: impl IntoIterator<Item = DeliveryReceipt>) -> usize {
        let mut admitted = 0;
        for receipt in receipts {
            if !self.contains(&receipt.message_id()) {
                self.entries.push(receipt);
                admitted += 1;
            }
        }
        admitted
    }

    /// Remove the receipt for `id`; removing twice is a no-op
    pub fn remove(&mut self, id: &MessageId) -> Option<DeliveryReceipt> {
        let idx = self.entries.iter().position(|r| r.message_id() == *id)?;
        Some(self.entries.remove(idx))
    }

    /// Remove and return every receipt matching `predicate`, in one step
    pub fn remove_where<F>(&mut self, mut predicate: F) -> Vec<DeliveryReceipt>
    where
        F: FnMut(&DeliveryReceipt) -> bool,
    {
        let (removed, kept) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|receipt| predicate(receipt));
        self.entries = kept;
        removed
    }

    /// Current receipts, in admission order
    pub fn entries(&self) -> &[DeliveryReceipt] {
        &self.entries
    }

    /// Whether a receipt exists for `id`
    pub fn contains(&self, id: &MessageId) -> bool {
        self.entries.iter().any(|r| r.message_id() == *id)
    }

    /// Number of receipts
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
