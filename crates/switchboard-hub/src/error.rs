//! Hub errors

use thiserror::Error;

use switchboard_core::{Address, HandshakeError};

/// Failures surfaced by the hub's own API. Routing anomalies are logged
/// rather than returned here.
#[derive(Debug, Error)]
pub enum HubError {
    /// The connect handshake could not be used
    #[error("connection refused: {0}")]
    Handshake(#[from] HandshakeError),

    /// A spoke claimed an address only the hub may hold
    #[error("connection refused: {0} is reserved for the hub")]
    ReservedAddress(Address),

    /// Invalid configuration
    #[error("invalid hub configuration: {0}")]
    Config(String),
}

/// Result alias for hub operations
pub type HubResult<T> = Result<T, HubError>;
