//! Switchboard Hub - Routing Core
//!
//! The hub is the only context every other context holds a channel to.
//! This crate holds its routing state and the glue feeding it:
//!
//! - [`Hub`]: accept, receive and close entry points for the transport,
//!   plus the hub's own send and handler registration
//! - [`Router`]: sender/destination resolution, delivery, deferral,
//!   session-end cascade and reconnect reconciliation
//! - [`ConnectionRegistry`]: one connection per address, fingerprint-checked
//!   removal
//! - [`notify`]: session-scoped notifications
//! - [`HubConfig`]: routing limits, loadable from TOML

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod hub;
pub mod notify;
pub mod registry;
pub mod resolve;
pub mod router;

pub use config::HubConfig;
pub use error::{HubError, HubResult};
pub use hub::{AmbientLocators, Connection, Hub};
pub use notify::notify;
pub use registry::{ConnectionRecord, ConnectionRegistry};
pub use resolve::{resolve_destination, resolve_sender};
pub use router::Router;
