//! Spoke side of the channel to the hub
//!
//! A [`SpokeLink`] is the bookkeeping a non-hub context keeps for its one
//! channel to the hub. The channel itself may drop and be replaced any
//! number of times; the link survives and on every [`attach`](SpokeLink::attach)
//! tells the hub what it is still waiting on:
//!
//! - requests the hub reported delivered but that have no reply yet, so the
//!   hub can re-admit them or report their destination gone;
//! - destinations the hub reported undeliverable, so the hub can tell the
//!   link when they come back.
//!
//! Queued requests are resent automatically when the hub reports their
//! destination deliverable.

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{debug, info, warn};

use switchboard_core::{
    Address, Channel, ConnectionArgs, DeliveryReceipt, Envelope, Fingerprint, HandshakeError,
    HubFrame, PendingDeliveryLog, SpokeFrame, SyncSnapshot,
};

use crate::error::{EndpointError, EndpointResult};
use crate::runtime::Outbound;

/// What the owner of the link must act on after a hub frame.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// Feed this envelope to the local runtime
    Incoming(Envelope),
    /// These requests will never be answered; their destination session ended
    Failed(Vec<Envelope>),
}

#[derive(Debug, Clone)]
struct QueuedEnvelope {
    envelope: Envelope,
    resolved_destination: Address,
}

#[derive(Debug, Default)]
struct LinkState {
    undelivered: Vec<QueuedEnvelope>,
    pending: PendingDeliveryLog,
}

/// Session bookkeeping for one context's channel to the hub.
pub struct SpokeLink {
    endpoint: Option<Address>,
    fingerprint: Fingerprint,
    channel: RwLock<Option<Arc<dyn Channel<SpokeFrame>>>>,
    state: Mutex<LinkState>,
}

impl SpokeLink {
    /// Link for a context claiming `endpoint`; tab agents pass `None` and let
    /// the hub derive their address
    pub fn new(endpoint: Option<Address>) -> Self {
        Self {
            endpoint,
            fingerprint: Fingerprint::fresh(),
            channel: RwLock::new(None),
            state: Mutex::new(LinkState::default()),
        }
    }

    /// Session fingerprint; stable across reconnects of this link
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Arguments for the connect handshake
    pub fn connection_args(&self) -> ConnectionArgs {
        ConnectionArgs {
            endpoint: self.endpoint.clone(),
            fingerprint: self.fingerprint,
        }
    }

    /// Encoded handshake
    pub fn handshake(&self) -> Result<String, HandshakeError> {
        self.connection_args().encode()
    }

    /// Adopt a freshly opened channel and send the sync snapshot over it
    pub fn attach(&self, channel: Arc<dyn Channel<SpokeFrame>>) -> EndpointResult<()> {
        let snapshot = self.snapshot();
        debug!(
            fingerprint = %self.fingerprint,
            pending = snapshot.pending_responses.len(),
            awaiting = snapshot.pending_deliveries.len(),
            "attaching link"
        );
        channel.send(SpokeFrame::Sync(snapshot))?;
        *self.channel.write() = Some(channel);
        Ok(())
    }

    /// Forget the current channel after it closed
    pub fn detach(&self) {
        *self.channel.write() = None;
    }

    /// Whether a channel is attached
    pub fn is_attached(&self) -> bool {
        self.channel.read().is_some()
    }

    /// What this link is still waiting on
    pub fn snapshot(&self) -> SyncSnapshot {
        let state = self.state.lock();
        let mut pending_deliveries: Vec<Address> = Vec::new();
        for queued in &state.undelivered {
            if !pending_deliveries.contains(&queued.resolved_destination) {
                pending_deliveries.push(queued.resolved_destination.clone());
            }
        }
        SyncSnapshot {
            pending_responses: state.pending.entries().to_vec(),
            pending_deliveries,
        }
    }

    /// Receipts of delivered requests still awaiting replies
    pub fn pending(&self) -> Vec<DeliveryReceipt> {
        self.state.lock().pending.entries().to_vec()
    }

    /// Requests queued until their destination becomes deliverable
    pub fn undelivered(&self) -> usize {
        self.state.lock().undelivered.len()
    }

    /// Send an envelope to the hub for routing
    pub fn post(&self, message: Envelope) -> EndpointResult<()> {
        let channel = self.channel.read().clone().ok_or(EndpointError::NotAttached)?;
        channel.send(SpokeFrame::Deliver { message })?;
        Ok(())
    }

    /// Apply a hub notification
    pub fn on_frame(&self, frame: HubFrame) -> EndpointResult<Option<LinkEvent>> {
        match frame {
            HubFrame::Undeliverable {
                resolved_destination,
                message,
            } => {
                let mut state = self.state.lock();
                let queued = state
                    .undelivered
                    .iter()
                    .any(|q| q.envelope.message_id == message.message_id);
                if !queued {
                    info!(
                        destination = %resolved_destination,
                        message_id = %message.message_id,
                        "destination undeliverable; queueing request"
                    );
                    state.undelivered.push(QueuedEnvelope {
                        envelope: message,
                        resolved_destination,
                    });
                }
                Ok(None)
            }

            HubFrame::Deliverable { deliverable_to } => {
                let ready: Vec<QueuedEnvelope> = {
                    let mut state = self.state.lock();
                    let (ready, waiting) = std::mem::take(&mut state.undelivered)
                        .into_iter()
                        .partition(|q| q.resolved_destination == deliverable_to);
                    state.undelivered = waiting;
                    ready
                };
                debug!(destination = %deliverable_to, count = ready.len(), "resending queued requests");

                let mut ready = ready.into_iter();
                while let Some(queued) = ready.next() {
                    if let Err(err) = self.post(queued.envelope.clone()) {
                        // Requeue what was not sent so the next sync asks again
                        let mut state = self.state.lock();
                        state.undelivered.push(queued);
                        state.undelivered.extend(ready);
                        return Err(err);
                    }
                }
                Ok(None)
            }

            HubFrame::Delivered { receipt } => {
                if receipt.envelope.is_request() {
                    self.state.lock().pending.add([receipt]);
                }
                Ok(None)
            }

            HubFrame::Incoming { message } => {
                if message.is_reply() {
                    self.state.lock().pending.remove(&message.message_id);
                }
                Ok(Some(LinkEvent::Incoming(message)))
            }

            HubFrame::Terminated { fingerprint } => {
                let failed = self
                    .state
                    .lock()
                    .pending
                    .remove_where(|receipt| receipt.to == fingerprint);
                if failed.is_empty() {
                    return Ok(None);
                }
                warn!(
                    session = %fingerprint,
                    count = failed.len(),
                    "destination session ended with requests outstanding"
                );
                Ok(Some(LinkEvent::Failed(
                    failed.into_iter().map(|receipt| receipt.envelope).collect(),
                )))
            }
        }
    }
}

impl Outbound for SpokeLink {
    fn route(&self, envelope: Envelope) -> EndpointResult<()> {
        self.post(envelope)
    }
}

impl std::fmt::Debug for SpokeLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpokeLink")
            .field("endpoint", &self.endpoint)
            .field("fingerprint", &self.fingerprint)
            .field("attached", &self.is_attached())
            .finish()
    }
}
