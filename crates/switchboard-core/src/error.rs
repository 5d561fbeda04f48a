//! Error types for the switchboard model
//!
//! Every failure here is a protocol-level failure: a value that arrived over
//! a channel (or was supplied by a caller) does not describe a valid address,
//! hop, frame or handshake. None of them are recoverable by retrying.

use thiserror::Error;

use crate::Address;

/// A string that does not encode an [`Address`](crate::Address).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressFormatError {
    /// The address string was empty
    #[error("address is empty")]
    Empty,

    /// The context kind is not one of the known kinds
    #[error("unknown context kind: {0:?}")]
    UnknownKind(String),

    /// A locator was not a canonical decimal integer
    #[error("invalid locator {locator:?} in address {address:?}")]
    InvalidLocator {
        /// The full address being parsed
        address: String,
        /// The offending locator text
        locator: String,
    },

    /// The instance name was empty or contained whitespace
    #[error("invalid instance name: {0:?}")]
    InvalidInstance(String),
}

/// A hop tag that could not be parsed back into a context identity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HopParseError {
    /// The `kind::instance` separator is missing
    #[error("hop {0:?} is missing the '::' separator")]
    MissingSeparator(String),

    /// The hop names a context kind that does not exist
    #[error("hop {hop:?} names an unknown context kind")]
    UnknownKind {
        /// The raw hop tag
        hop: String,
    },

    /// The hop carries no instance identifier
    #[error("hop {0:?} has an empty instance identifier")]
    EmptyInstance(String),
}

/// Failures reported by a channel implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The channel is closed; nothing more can be sent over it
    #[error("channel closed")]
    Closed,

    /// The frame could not be handed to the transport
    #[error("channel send failed: {0}")]
    Send(String),
}

/// Failures decoding a wire frame.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The frame is not valid JSON for the expected shape
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Failures decoding the connect-time handshake.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The handshake string is not a valid connection argument encoding
    #[error("undecodable handshake: {0}")]
    Undecodable(#[from] serde_json::Error),

    /// No endpoint was given and the transport supplied no tab locator
    #[error("handshake omits the endpoint and the transport has no tab locator")]
    MissingLocators,
}

/// Failures while the hub routes an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// A hop in the envelope path is malformed
    #[error("malformed hop: {0}")]
    MalformedHop(#[from] HopParseError),

    /// The envelope crossed more forwarding contexts than allowed
    #[error("envelope crossed {hops} hops (max: {max})")]
    TooManyHops {
        /// Hops recorded on the envelope
        hops: usize,
        /// Configured limit
        max: usize,
    },

    /// The envelope violates the addressing rules
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Too many of the hub's own requests are already waiting on the
    /// destination to connect
    #[error("{waiting} requests already waiting on {destination}")]
    DeferralLimit {
        /// Resolved destination
        destination: Address,
        /// Requests already waiting on it
        waiting: usize,
    },

    /// The destination channel refused the envelope
    #[error("delivery failed: {0}")]
    Channel(#[from] ChannelError),
}
