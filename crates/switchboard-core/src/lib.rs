//! Switchboard Core - Addressing and Session Model
//!
//! Shared vocabulary for every context taking part in switchboard messaging:
//! the hub, tab agents, extension pages and the frames and page scripts that
//! reach the hub only through a forwarder.
//!
//! # Contents
//!
//! - [`Address`] / [`ContextKind`]: who a context is, with an exact
//!   string encoding
//! - [`HopTag`]: identity a relaying runtime stamps on an envelope
//! - [`Fingerprint`]: identity of one session at an address
//! - [`Envelope`]: the request/reply value exchanged end-to-end
//! - [`PendingDeliveryLog`]: ledger of delivered requests awaiting replies
//! - [`SpokeFrame`] / [`HubFrame`] / [`ConnectionArgs`]: what crosses a
//!   spoke's channel to the hub
//! - [`Channel`]: the sending half of a transport
//!
//! Nothing here performs I/O or holds shared state.

#![forbid(unsafe_code)]

pub mod address;
pub mod channel;
pub mod envelope;
pub mod error;
pub mod fingerprint;
pub mod frames;
pub mod hop;
pub mod receipt;

pub use address::{Address, ContextKind};
pub use channel::Channel;
pub use envelope::{Envelope, HandlerFault, MessageId, MessageKind, TransactionId};
pub use error::{
    AddressFormatError, ChannelError, FrameError, HandshakeError, HopParseError, RouteError,
};
pub use fingerprint::{Fingerprint, FingerprintParseError};
pub use frames::{ConnectionArgs, HubFrame, SpokeFrame, SyncSnapshot};
pub use hop::{parse_hop, HopTag};
pub use receipt::{DeliveryReceipt, PendingDeliveryLog, ReceiptSender};
