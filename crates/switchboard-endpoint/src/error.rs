//! Endpoint errors
//!
//! These are what a caller of [`EndpointRuntime::send`](crate::EndpointRuntime::send)
//! can observe. Handler failures on the remote side arrive as
//! [`EndpointError::Remote`]; they never surface inside the runtime that ran
//! the handler.

use switchboard_core::{ChannelError, HandlerFault, RouteError, TransactionId};
use thiserror::Error;

/// Failures of an endpoint operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
    /// The request breaks addressing rules and was never sent
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The destination session ended before replying
    #[error("session ended before {transaction_id} completed")]
    SessionEnded {
        /// The failed transaction
        transaction_id: TransactionId,
    },

    /// The transaction was ended locally before a reply arrived
    #[error("transaction {transaction_id} was ended before it could complete")]
    TransactionEnded {
        /// The cancelled transaction
        transaction_id: TransactionId,
    },

    /// The remote handler reported a failure
    #[error("remote handler failed: {0}")]
    Remote(HandlerFault),

    /// The hub refused to route the envelope
    #[error(transparent)]
    Route(#[from] RouteError),

    /// The outbound channel refused the envelope
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// The link has no channel to the hub yet
    #[error("link is not attached to a channel")]
    NotAttached,
}

/// Result alias for endpoint operations
pub type EndpointResult<T> = Result<T, EndpointError>;
