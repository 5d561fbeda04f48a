//! Endpoint runtime
//!
//! Every context, the hub included, runs one [`EndpointRuntime`]. It owns the
//! context's topic handlers and its open transactions, and it is the single
//! entry point for envelopes arriving from the transport layer:
//!
//! ```text
//! handle_message(envelope)
//!   ├─ destination is elsewhere ─▶ push own hop, Outbound::route
//!   ├─ local reply              ─▶ settle the open transaction (or drop)
//!   └─ local request            ─▶ run handler ─▶ reply toward origin
//! ```
//!
//! Transactions are keyed by transaction id; the first settlement wins and
//! every later one is a silent no-op.

use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use switchboard_core::{
    Address, ContextKind, Envelope, HandlerFault, HopTag, MessageKind, TransactionId,
};

use crate::error::{EndpointError, EndpointResult};
use crate::handler::{IncomingMessage, MessageHandler};

type Settlement = oneshot::Sender<EndpointResult<Value>>;

/// Where a runtime sends envelopes that are not for itself.
pub trait Outbound: Send + Sync {
    /// Hand an envelope to the next context on its path
    fn route(&self, envelope: Envelope) -> EndpointResult<()>;

    /// Tell the next context down that a transaction it started has failed
    fn cancel(&self, _transaction_id: TransactionId) -> EndpointResult<()> {
        Ok(())
    }
}

/// Per-context request/reply runtime.
pub struct EndpointRuntime {
    address: Address,
    hop: HopTag,
    outbound: Arc<dyn Outbound>,
    handlers: RwLock<HashMap<String, Arc<dyn MessageHandler>>>,
    transactions: Mutex<HashMap<TransactionId, Settlement>>,
}

impl EndpointRuntime {
    /// Runtime for an unnamed context of `kind`
    pub fn new(kind: ContextKind, outbound: Arc<dyn Outbound>) -> Self {
        Self::with_address(Address::new(kind), outbound)
    }

    /// Runtime answering at `address`; locators are ignored, the hub strips
    /// them before delivery
    pub fn with_address(address: Address, outbound: Arc<dyn Outbound>) -> Self {
        let address = address.unqualified();
        let hop = HopTag::new(address.kind(), Uuid::new_v4().to_string());
        Self {
            address,
            hop,
            outbound,
            handlers: RwLock::new(HashMap::new()),
            transactions: Mutex::new(HashMap::new()),
        }
    }

    /// Address this runtime answers at
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Context kind
    pub fn kind(&self) -> ContextKind {
        self.address.kind()
    }

    /// Hop tag this runtime stamps on relayed envelopes
    pub fn hop(&self) -> &HopTag {
        &self.hop
    }

    /// Whether an envelope for `destination` is handled here
    pub fn is_local(&self, destination: &Address) -> bool {
        destination.kind() == self.address.kind()
            && !destination.is_qualified()
            && destination
                .instance()
                .map_or(true, |name| Some(name) == self.address.instance())
    }

    /// Register the handler for `topic`, replacing any previous one
    pub fn on_message<H>(&self, topic: impl Into<String>, handler: H) -> Option<Arc<dyn MessageHandler>>
    where
        H: MessageHandler + 'static,
    {
        let topic = topic.into();
        debug!(context = %self.address, %topic, "registering handler");
        self.handlers.write().insert(topic, Arc::new(handler))
    }

    /// Remove the handler for `topic`
    pub fn remove_handler(&self, topic: &str) -> bool {
        self.handlers.write().remove(topic).is_some()
    }

    /// Number of transactions waiting for a reply
    pub fn open_transactions(&self) -> usize {
        self.transactions.lock().len()
    }

    /// Send a request and wait for its reply.
    ///
    /// Addressing violations are returned before anything is sent. The
    /// future stays pending until a reply arrives, the transaction is ended,
    /// or the destination session ends; no timeout is applied here.
    pub async fn send(
        &self,
        topic: impl Into<String>,
        payload: Value,
        destination: Address,
    ) -> EndpointResult<Value> {
        self.check_destination(&destination)?;

        let envelope = Envelope::request(self.address.clone(), destination, topic, payload);
        let transaction_id = envelope.transaction_id;
        let (tx, rx) = oneshot::channel();
        self.transactions.lock().insert(transaction_id, tx);

        debug!(
            context = %self.address,
            destination = %envelope.destination,
            topic = %envelope.topic,
            %transaction_id,
            "sending request"
        );

        if self.is_local(&envelope.destination) {
            self.handle_message(envelope).await;
        } else if let Err(err) = self.forward(envelope) {
            self.transactions.lock().remove(&transaction_id);
            return Err(err);
        }

        rx.await
            .unwrap_or(Err(EndpointError::TransactionEnded { transaction_id }))
    }

    /// Process one envelope from the transport layer. Never fails.
    pub async fn handle_message(&self, envelope: Envelope) {
        if !self.is_local(&envelope.destination) {
            self.forward_or_log(envelope);
            return;
        }

        match envelope.message_type {
            MessageKind::Reply => self.settle(envelope),
            MessageKind::Message => {
                let reply = self.answer(&envelope).await;
                if self.is_local(&reply.destination) {
                    self.settle(reply);
                } else {
                    self.forward_or_log(reply);
                }
            }
        }
    }

    /// Reject the transaction locally; `false` if it was no longer open
    pub fn end_transaction(&self, transaction_id: TransactionId) -> bool {
        self.reject(
            transaction_id,
            EndpointError::TransactionEnded { transaction_id },
        )
    }

    /// Reject the transaction because its destination session ended
    pub fn terminate_transaction(&self, transaction_id: TransactionId) -> bool {
        self.reject(transaction_id, EndpointError::SessionEnded { transaction_id })
    }

    fn reject(&self, transaction_id: TransactionId, err: EndpointError) -> bool {
        let Some(settlement) = self.transactions.lock().remove(&transaction_id) else {
            return false;
        };
        debug!(context = %self.address, %transaction_id, error = %err, "transaction rejected");
        // The caller may have stopped waiting
        let _ = settlement.send(Err(err));
        true
    }

    fn check_destination(&self, destination: &Address) -> EndpointResult<()> {
        if !self.address.kind().is_tab_scoped()
            && destination.kind().requires_tab_locator()
            && !destination.is_qualified()
        {
            return Err(EndpointError::ProtocolViolation(format!(
                "{} cannot address {destination} without a tab locator; use {}@<tab>",
                self.address,
                destination.kind()
            )));
        }
        Ok(())
    }

    fn forward(&self, mut envelope: Envelope) -> EndpointResult<()> {
        envelope.push_hop(&self.hop);
        trace!(context = %self.address, hops = ?envelope.hops, "forwarding envelope");
        self.outbound.route(envelope)
    }

    fn forward_or_log(&self, envelope: Envelope) {
        let message_id = envelope.message_id;
        let destination = envelope.destination.clone();
        if let Err(err) = self.forward(envelope) {
            warn!(
                context = %self.address,
                %destination,
                %message_id,
                error = %err,
                "failed to forward envelope"
            );
        }
    }

    async fn answer(&self, request: &Envelope) -> Envelope {
        let handler = self.handlers.read().get(&request.topic).cloned();

        let result = match handler {
            Some(handler) => {
                let incoming = IncomingMessage::from(request);
                AssertUnwindSafe(handler.handle(incoming))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        Err(HandlerFault::new(
                            "HandlerPanic",
                            format!("handler for '{}' panicked", request.topic),
                        ))
                    })
            }
            None => Err(HandlerFault::new(
                "NoHandler",
                format!(
                    "no handler registered in '{}' for topic '{}'",
                    self.address, request.topic
                ),
            )),
        };

        if let Err(fault) = &result {
            warn!(
                context = %self.address,
                topic = %request.topic,
                sender = %request.origin,
                %fault,
                "handler failed; replying with fault"
            );
        }

        request.reply(self.address.clone(), result)
    }

    fn settle(&self, reply: Envelope) {
        let Some(settlement) = self.transactions.lock().remove(&reply.transaction_id) else {
            debug!(
                context = %self.address,
                transaction_id = %reply.transaction_id,
                "dropping reply for unknown or settled transaction"
            );
            return;
        };

        let result = match reply.fault {
            Some(fault) => Err(EndpointError::Remote(fault)),
            None => Ok(reply.payload),
        };
        let _ = settlement.send(result);
    }
}

impl std::fmt::Debug for EndpointRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointRuntime")
            .field("address", &self.address)
            .field("hop", &self.hop)
            .field("handlers", &self.handlers.read().len())
            .field("transactions", &self.transactions.lock().len())
            .finish()
    }
}
