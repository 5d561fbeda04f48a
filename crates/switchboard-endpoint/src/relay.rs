//! Forwarding contexts
//!
//! Tab agents relay for the page scripts and frames of their tab; extension
//! pages relay for the frames they embed. A [`RelayOutbound`] sits behind the
//! forwarder's runtime and picks a direction for each envelope that is not
//! for the forwarder itself.

use std::sync::Arc;
use tracing::warn;

use switchboard_core::{Address, ContextKind, Envelope, TransactionId};

use crate::error::EndpointResult;
use crate::runtime::{EndpointRuntime, Outbound};

/// Which side of a forwarder an envelope leaves by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Toward the hub
    Upstream,
    /// Toward the page or frame the forwarder hosts
    Downstream,
}

/// Direction an envelope takes out of a forwarder of kind `host`.
///
/// Only envelopes for a hosted context without locators go down. A page
/// script or frame named with a tab locator may live in another tab, so the
/// hub has to resolve it; the hub strips locators once it has.
pub fn direction(host: ContextKind, envelope: &Envelope) -> Direction {
    let destination = &envelope.destination;
    let hosted = match host {
        ContextKind::ContentScript => destination.kind().is_page_context(),
        host if host.is_extension_page() => destination.kind() == ContextKind::Frame,
        _ => false,
    };

    if hosted && !destination.is_qualified() {
        Direction::Downstream
    } else {
        Direction::Upstream
    }
}

/// Rewrite the origin of an envelope received from below.
///
/// Whatever the page claims, its envelope originates from the page script or
/// frame kind, without locators; the hub stamps the tab itself.
pub fn adopt_forwarded(host: ContextKind, mut envelope: Envelope) -> Envelope {
    let claimed = envelope.origin.kind();
    let kind = if host.is_extension_page() || claimed == ContextKind::Frame {
        ContextKind::Frame
    } else {
        ContextKind::Window
    };
    envelope.origin = Address::new(kind);
    envelope
}

/// Outbound of a forwarding context.
pub struct RelayOutbound {
    host: ContextKind,
    upstream: Arc<dyn Outbound>,
    downstream: Arc<dyn Outbound>,
}

impl RelayOutbound {
    /// Relay for a forwarder of kind `host`
    pub fn new(host: ContextKind, upstream: Arc<dyn Outbound>, downstream: Arc<dyn Outbound>) -> Self {
        Self {
            host,
            upstream,
            downstream,
        }
    }

    /// Fail a request whose destination session ended.
    ///
    /// Requests relayed for a hosted page are cancelled downstream; the
    /// forwarder's own requests are terminated in its runtime.
    pub fn fail(&self, runtime: &EndpointRuntime, envelope: &Envelope) {
        let transaction_id = envelope.transaction_id;
        if envelope.origin.kind().is_page_context() {
            if let Err(err) = self.downstream.cancel(transaction_id) {
                warn!(%transaction_id, error = %err, "failed to cancel downstream transaction");
            }
        } else {
            runtime.terminate_transaction(transaction_id);
        }
    }
}

impl Outbound for RelayOutbound {
    fn route(&self, envelope: Envelope) -> EndpointResult<()> {
        match direction(self.host, &envelope) {
            Direction::Upstream => self.upstream.route(envelope),
            Direction::Downstream => self.downstream.route(envelope),
        }
    }

    fn cancel(&self, transaction_id: TransactionId) -> EndpointResult<()> {
        self.downstream.cancel(transaction_id)
    }
}
