//! Switchboard Endpoint - Per-Context Runtime
//!
//! Everything a context needs to take part in switchboard messaging:
//!
//! - [`EndpointRuntime`]: send requests, register topic handlers, settle
//!   replies, cancel transactions
//! - [`SpokeLink`]: bookkeeping for a non-hub context's channel to the hub,
//!   including the sync snapshot sent after every reconnect
//! - [`RelayOutbound`]: direction rules for contexts that forward on behalf
//!   of pages and frames
//!
//! The hub runs the same [`EndpointRuntime`] with the router behind its
//! [`Outbound`].

#![forbid(unsafe_code)]

pub mod error;
pub mod handler;
pub mod link;
pub mod relay;
pub mod runtime;

pub use error::{EndpointError, EndpointResult};
pub use handler::{IncomingMessage, MessageHandler};
pub use link::{LinkEvent, SpokeLink};
pub use relay::{adopt_forwarded, direction, Direction, RelayOutbound};
pub use runtime::{EndpointRuntime, Outbound};
