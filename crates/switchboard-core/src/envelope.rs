//! Message envelopes
//!
//! The [`Envelope`] is the only value that crosses contexts. Requests carry
//! [`MessageKind::Message`]; the answering context builds the matching
//! [`MessageKind::Reply`] with [`Envelope::reply`], which keeps the message
//! and transaction identifiers so both the hub's pending log and the
//! requester's runtime can correlate it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use crate::address::Address;
use crate::hop::HopTag;

/// Correlates a reply with its request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Generate a new message identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg-{}", self.0)
    }
}

/// Identifies one logical request/reply conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(Uuid);

impl TransactionId {
    /// Generate a new transaction identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx-{}", self.0)
    }
}

/// Request or reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// A request expecting exactly one reply
    Message,
    /// The answer to a request
    Reply,
}

/// Error marker carried by a reply whose handler failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{name}: {message}")]
pub struct HandlerFault {
    /// Error class, e.g. `NoHandler` or the handler's own error name
    pub name: String,
    /// Human readable description
    pub message: String,
}

impl HandlerFault {
    /// Create a fault
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Capture any error as a fault
    pub fn from_error<E: std::error::Error + ?Sized>(err: &E) -> Self {
        Self::new("Error", err.to_string())
    }
}

/// The message value exchanged end-to-end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Context that built the envelope
    pub origin: Address,
    /// Context the envelope is for
    pub destination: Address,
    /// Request or reply
    pub message_type: MessageKind,
    /// Request/reply correlation id
    #[serde(rename = "messageID")]
    pub message_id: MessageId,
    /// Conversation id used for cancellation
    pub transaction_id: TransactionId,
    /// Handler topic; routing never inspects it
    pub topic: String,
    /// Request data or reply result
    #[serde(default)]
    pub payload: Value,
    /// Present on replies whose handler failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<HandlerFault>,
    /// Relaying runtimes, oldest first
    #[serde(default)]
    pub hops: Vec<String>,
    /// Creation time, milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl Envelope {
    /// Build a fresh request
    pub fn request(
        origin: Address,
        destination: Address,
        topic: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            origin,
            destination,
            message_type: MessageKind::Message,
            message_id: MessageId::new(),
            transaction_id: TransactionId::new(),
            topic: topic.into(),
            payload,
            fault: None,
            hops: Vec::new(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Build the reply to this request, addressed back to its origin.
    ///
    /// The reply starts a fresh hop list: it travels its own path.
    pub fn reply(&self, responder: Address, result: Result<Value, HandlerFault>) -> Self {
        let (payload, fault) = match result {
            Ok(payload) => (payload, None),
            Err(fault) => (Value::Null, Some(fault)),
        };
        Self {
            origin: responder,
            destination: self.origin.clone(),
            message_type: MessageKind::Reply,
            message_id: self.message_id,
            transaction_id: self.transaction_id,
            topic: self.topic.clone(),
            payload,
            fault,
            hops: Vec::new(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Whether this is a request
    pub fn is_request(&self) -> bool {
        self.message_type == MessageKind::Message
    }

    /// Whether this is a reply
    pub fn is_reply(&self) -> bool {
        self.message_type == MessageKind::Reply
    }

    /// Record a relaying runtime
    pub fn push_hop(&mut self, hop: &HopTag) {
        self.hops.push(hop.to_string());
    }

    /// The hop `back` positions from the end (`0` is the most recent)
    pub fn hop_from_end(&self, back: usize) -> Option<&str> {
        self.hops
            .len()
            .checked_sub(back + 1)
            .and_then(|idx| self.hops.get(idx))
            .map(String::as_str)
    }
}
