//! The hub
//!
//! Ties the hub's own [`EndpointRuntime`] to the [`Router`]. The transport
//! layer drives it with three calls per channel: [`Hub::accept`] when a
//! channel opens, [`Hub::receive`] for every frame and [`Hub::close`] when
//! it closes. Each call runs to completion before the next one for the same
//! channel.

use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use switchboard_core::{
    Address, Channel, ConnectionArgs, ContextKind, DeliveryReceipt, Envelope, Fingerprint,
    HandshakeError, HubFrame, SpokeFrame, TransactionId,
};
use switchboard_endpoint::{EndpointResult, EndpointRuntime, MessageHandler, Outbound};

use crate::config::HubConfig;
use crate::error::{HubError, HubResult};
use crate::router::Router;

/// Tab and frame the transport itself reports for a channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AmbientLocators {
    /// Tab the channel was opened from
    pub tab: Option<u32>,
    /// Frame within that tab; `0` is the top frame
    pub frame: Option<u32>,
}

impl AmbientLocators {
    /// Locators of a channel opened from `frame` of `tab`
    pub fn tab(tab: u32, frame: u32) -> Self {
        Self {
            tab: Some(tab),
            frame: Some(frame),
        }
    }
}

/// An accepted channel, as the hub knows it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    address: Address,
    fingerprint: Fingerprint,
}

impl Connection {
    /// Registry address of the connected context
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Session fingerprint of the connected context
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Tab linked to this channel; stamped on everything that arrives on it
    pub fn linked_tab(&self) -> Option<u32> {
        self.address.primary()
    }

    /// Frame linked to this channel
    pub fn linked_frame(&self) -> Option<u32> {
        self.address.secondary()
    }
}

struct RouterOutbound {
    router: Arc<Mutex<Router>>,
}

impl Outbound for RouterOutbound {
    fn route(&self, envelope: Envelope) -> EndpointResult<()> {
        self.router.lock().route(envelope)?;
        Ok(())
    }
}

/// Hub of the messaging topology.
#[derive(Clone)]
pub struct Hub {
    runtime: Arc<EndpointRuntime>,
    router: Arc<Mutex<Router>>,
}

impl Hub {
    /// Create a hub with a validated configuration
    pub fn new(config: HubConfig) -> HubResult<Self> {
        config.validate()?;
        let router = Arc::new(Mutex::new(Router::new(config)));
        let outbound = Arc::new(RouterOutbound {
            router: Arc::clone(&router),
        });
        let runtime = Arc::new(EndpointRuntime::new(ContextKind::Background, outbound));
        Ok(Self { runtime, router })
    }

    /// The hub's own runtime
    pub fn runtime(&self) -> &Arc<EndpointRuntime> {
        &self.runtime
    }

    /// Session fingerprint of the hub
    pub fn fingerprint(&self) -> Fingerprint {
        self.router.lock().hub_fingerprint()
    }

    /// Register the hub's handler for `topic`
    pub fn on_message<H>(&self, topic: impl Into<String>, handler: H) -> Option<Arc<dyn MessageHandler>>
    where
        H: MessageHandler + 'static,
    {
        self.runtime.on_message(topic, handler)
    }

    /// Send a request from the hub.
    ///
    /// A destination that is not connected yet receives the request as soon
    /// as it connects. Tab agents, devtools pages and page scripts must be
    /// addressed with a tab locator.
    pub async fn send(
        &self,
        topic: impl Into<String>,
        payload: Value,
        destination: Address,
    ) -> EndpointResult<Value> {
        self.runtime.send(topic, payload, destination).await
    }

    /// Accept a newly opened channel.
    ///
    /// A handshake without an address is a tab agent: its address comes from
    /// the transport's locators, never from the handshake.
    pub fn accept(
        &self,
        handshake: &str,
        ambient: AmbientLocators,
        channel: Arc<dyn Channel<HubFrame>>,
    ) -> HubResult<Connection> {
        let args = ConnectionArgs::decode(handshake)?;

        let address = match args.endpoint {
            Some(address) => address,
            None => {
                let tab = ambient.tab.ok_or(HandshakeError::MissingLocators)?;
                Address::in_tab(ContextKind::ContentScript, tab, ambient.frame)
            }
        };

        if address.kind().is_hub() {
            warn!(%address, "refusing connection claiming the hub address");
            return Err(HubError::ReservedAddress(address));
        }

        // Frame 0 is the top frame
        let address = match address.secondary() {
            Some(0) => address.clone().with_locators(address.primary(), None),
            _ => address,
        };

        let connection = Connection {
            address,
            fingerprint: args.fingerprint,
        };
        let failed = self
            .router
            .lock()
            .connect(connection.address.clone(), connection.fingerprint, channel);
        for transaction_id in failed {
            self.runtime.terminate_transaction(transaction_id);
        }

        Ok(connection)
    }

    /// Process one frame from an accepted channel
    pub async fn receive(&self, connection: &Connection, frame: SpokeFrame) {
        match frame {
            SpokeFrame::Sync(snapshot) => {
                self.router
                    .lock()
                    .reconcile(&connection.address, connection.fingerprint, snapshot);
            }

            SpokeFrame::Deliver { mut message } => {
                message.origin = message
                    .origin
                    .with_locators(connection.linked_tab(), connection.linked_frame());
                if message.destination.kind().is_hub() {
                    message.destination = message.destination.unqualified();
                }

                let for_hub = self.runtime.is_local(&message.destination);
                if message.is_request() {
                    let mut router = self.router.lock();
                    router.track_request_source(
                        message.transaction_id,
                        connection.address.clone(),
                        connection.fingerprint,
                    );
                    if for_hub {
                        if let Err(err) = router.acknowledge_local(&message) {
                            warn!(source = %connection.address, error = %err, "cannot acknowledge request");
                        }
                    }
                } else if for_hub {
                    self.router.lock().settle_local_reply(&message);
                }

                self.runtime.handle_message(message).await;
            }
        }
    }

    /// Forget a closed channel and end its session
    pub fn close(&self, connection: &Connection) {
        let ended = self
            .router
            .lock()
            .disconnect(&connection.address, connection.fingerprint);

        for transaction_id in ended {
            self.runtime.terminate_transaction(transaction_id);
        }
        info!(address = %connection.address, fingerprint = %connection.fingerprint, "channel closed");
    }

    /// Whether a context is connected at `address`
    pub fn is_connected(&self, address: &Address) -> bool {
        self.router.lock().registry().contains(address)
    }

    /// Delivered requests still awaiting replies
    pub fn pending_receipts(&self) -> Vec<DeliveryReceipt> {
        self.router.lock().pending().entries().to_vec()
    }

    /// Requests whose source connection is still remembered
    pub fn tracked_sources(&self) -> usize {
        self.router.lock().tracked_sources()
    }

    /// One-shot entries waiting for `address` to connect
    pub fn deferred_for(&self, address: &Address) -> usize {
        self.router.lock().deferred_for(address)
    }

    /// End one of the hub's own transactions locally
    pub fn end_transaction(&self, transaction_id: TransactionId) -> bool {
        self.runtime.end_transaction(transaction_id)
    }
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("runtime", &self.runtime)
            .field("connections", &self.router.lock().registry().len())
            .finish()
    }
}
