//! Frames exchanged over a spoke's channel to the hub
//!
//! Spokes send [`SpokeFrame`]s: envelopes to deliver and, right after
//! (re)connecting, a [`SyncSnapshot`] of what they are still waiting on. The
//! hub answers with [`HubFrame`]s, one per notification kind. Both encode to
//! JSON; the connect-time handshake is a JSON [`ConnectionArgs`].

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::envelope::Envelope;
use crate::error::{FrameError, HandshakeError};
use crate::fingerprint::Fingerprint;
use crate::receipt::DeliveryReceipt;

/// What a reconnecting spoke still expects from the hub.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSnapshot {
    /// Requests delivered but not yet answered
    pub pending_responses: Vec<DeliveryReceipt>,
    /// Destinations the spoke wants a deliverability notice for
    pub pending_deliveries: Vec<Address>,
}

/// Spoke to hub
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SpokeFrame {
    /// Reconciliation snapshot, sent on every (re)connect
    Sync(SyncSnapshot),
    /// Envelope to route
    Deliver {
        /// The envelope
        message: Envelope,
    },
}

/// Hub to spoke
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum HubFrame {
    /// An envelope addressed to (or through) this spoke
    Incoming {
        /// The envelope
        message: Envelope,
    },
    /// A request this spoke sent reached its destination
    Delivered {
        /// Receipt of the delivery
        receipt: DeliveryReceipt,
    },
    /// A request this spoke sent could not be delivered right now
    #[serde(rename_all = "camelCase")]
    Undeliverable {
        /// Address the hub resolved the destination to
        resolved_destination: Address,
        /// The request, as the spoke sent it
        message: Envelope,
    },
    /// A destination this spoke waited on is now connected
    #[serde(rename_all = "camelCase")]
    Deliverable {
        /// The now reachable address
        deliverable_to: Address,
    },
    /// A session this spoke had requests pending with has ended
    Terminated {
        /// Fingerprint of the ended session
        fingerprint: Fingerprint,
    },
}

impl SpokeFrame {
    /// Encode as JSON
    pub fn encode(&self) -> Result<String, FrameError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from JSON
    pub fn decode(raw: &str) -> Result<Self, FrameError> {
        Ok(serde_json::from_str(raw)?)
    }
}

impl HubFrame {
    /// Encode as JSON
    pub fn encode(&self) -> Result<String, FrameError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from JSON
    pub fn decode(raw: &str) -> Result<Self, FrameError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Short name of the notification kind, for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            HubFrame::Incoming { .. } => "incoming",
            HubFrame::Delivered { .. } => "delivered",
            HubFrame::Undeliverable { .. } => "undeliverable",
            HubFrame::Deliverable { .. } => "deliverable",
            HubFrame::Terminated { .. } => "terminated",
        }
    }
}

/// Connect-time handshake.
///
/// Tab agents omit `endpoint`: the hub derives their address from the
/// transport's own tab and frame, so a page cannot claim another tab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionArgs {
    /// Address the connecting context claims
    #[serde(default, rename = "endpointName")]
    pub endpoint: Option<Address>,
    /// Session fingerprint of the connecting context
    pub fingerprint: Fingerprint,
}

impl ConnectionArgs {
    /// Encode for the channel handshake
    pub fn encode(&self) -> Result<String, HandshakeError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a channel handshake
    pub fn decode(raw: &str) -> Result<Self, HandshakeError> {
        Ok(serde_json::from_str(raw)?)
    }
}
