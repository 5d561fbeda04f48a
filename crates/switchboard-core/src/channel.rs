//! Duplex channel seam
//!
//! Concrete transports (persistent ports, cross-document bridges) live outside
//! this workspace. The core only needs to push a frame into one end; incoming
//! frames and close events are fed to the hub or spoke by whoever owns the
//! transport.

use crate::error::ChannelError;

/// Sending half of a point-to-point channel carrying frames of type `F`.
///
/// `send` must not block and must not call back into the router
/// synchronously.
pub trait Channel<F>: Send + Sync {
    /// Push a frame to the other end
    fn send(&self, frame: F) -> Result<(), ChannelError>;
}
