//! Switchboard Testing Infrastructure
//!
//! Shared doubles and fixtures for the switchboard crates: channels and
//! outbounds that record what they are given, address and envelope
//! builders, and a tracing subscriber for test output.
//!
//! Add this to a crate's `Cargo.toml` dev-dependencies:
//! ```toml
//! [dev-dependencies]
//! switchboard-testkit = { workspace = true }
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

pub mod channel;
pub mod fixtures;
pub mod logging;
pub mod outbound;

pub use channel::RecordingChannel;
pub use fixtures::*;
pub use logging::init_test_tracing;
pub use outbound::RecordingOutbound;
