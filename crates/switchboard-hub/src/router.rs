//! Hub router
//!
//! Owns every piece of routing state: the connection registry, the log of
//! delivered requests awaiting replies, the one-shot entries waiting on an
//! address to connect, and the table recording which connection each
//! request arrived on.
//!
//! Per envelope handed over by the hub's runtime:
//!
//! ```text
//! route(envelope)
//!   ├─ resolve sender and destination
//!   ├─ strip destination locators
//!   ├─ destination connected ─▶ Incoming to it, Delivered to the sender
//!   ├─ request from the hub   ─▶ deliver once the destination connects
//!   ├─ request from a spoke   ─▶ Undeliverable now, Deliverable later
//!   └─ reply                  ─▶ dropped
//! ```
//!
//! The router never calls back into a runtime. Hub transactions that must
//! fail are returned to the caller instead.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use switchboard_core::{
    Address, Channel, DeliveryReceipt, Envelope, Fingerprint, HubFrame, MessageKind,
    PendingDeliveryLog, ReceiptSender, RouteError, SyncSnapshot, TransactionId,
};

use crate::config::HubConfig;
use crate::notify::notify;
use crate::registry::{ConnectionRecord, ConnectionRegistry};
use crate::resolve::{resolve_destination, resolve_sender};

/// Work waiting for an address to connect
#[derive(Debug, Clone)]
enum Deferred {
    /// A request from the hub's own runtime
    Deliver { envelope: Envelope, sender: Address },
    /// A spoke asked to hear when the address becomes reachable
    NotifyDeliverable {
        waiter: Address,
        waiter_fingerprint: Fingerprint,
    },
}

/// Routing state of the hub.
#[derive(Debug)]
pub struct Router {
    config: HubConfig,
    hub_fingerprint: Fingerprint,
    registry: ConnectionRegistry,
    pending: PendingDeliveryLog,
    deferred: HashMap<Address, VecDeque<Deferred>>,
    request_sources: HashMap<TransactionId, (Address, Fingerprint)>,
}

impl Router {
    /// Empty router
    pub fn new(config: HubConfig) -> Self {
        Self {
            config,
            hub_fingerprint: Fingerprint::fresh(),
            registry: ConnectionRegistry::new(),
            pending: PendingDeliveryLog::new(),
            deferred: HashMap::new(),
            request_sources: HashMap::new(),
        }
    }

    /// Session fingerprint of the hub itself
    pub fn hub_fingerprint(&self) -> Fingerprint {
        self.hub_fingerprint
    }

    /// Active configuration
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Connection registry
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Delivered requests awaiting replies
    pub fn pending(&self) -> &PendingDeliveryLog {
        &self.pending
    }

    /// Number of one-shot entries waiting on `address`
    pub fn deferred_for(&self, address: &Address) -> usize {
        self.deferred.get(address).map_or(0, VecDeque::len)
    }

    /// Remember the connection a request arrived on, for routing its reply
    pub fn track_request_source(
        &mut self,
        transaction_id: TransactionId,
        source: Address,
        source_fingerprint: Fingerprint,
    ) {
        self.request_sources
            .insert(transaction_id, (source, source_fingerprint));
    }

    /// Number of requests whose source connection is remembered
    pub fn tracked_sources(&self) -> usize {
        self.request_sources.len()
    }

    /// Settle the receipt of a hub request answered by `reply`.
    ///
    /// Replies to the hub are handled by its runtime and never routed.
    pub fn settle_local_reply(&mut self, reply: &Envelope) {
        if self.pending.remove(&reply.message_id).is_some() {
            debug!(message_id = %reply.message_id, "hub request answered");
        }
    }

    /// Route an envelope the hub's runtime could not handle itself.
    ///
    /// The hub's own hop must be the last one on the envelope.
    pub fn route(&mut self, mut envelope: Envelope) -> Result<(), RouteError> {
        if envelope.hops.len() > self.config.max_hops {
            return Err(RouteError::TooManyHops {
                hops: envelope.hops.len(),
                max: self.config.max_hops,
            });
        }

        let sender = resolve_sender(&envelope.origin, envelope.hop_from_end(1))?;
        let source = match envelope.message_type {
            MessageKind::Reply => self
                .request_sources
                .remove(&envelope.transaction_id)
                .map(|(source, _)| source),
            MessageKind::Message => None,
        };
        let destination = resolve_destination(&envelope, source.as_ref());

        if self.registry.contains(&destination) {
            envelope.destination = envelope.destination.unqualified();
            return self.deliver(envelope, &destination, &sender);
        }

        match envelope.message_type {
            MessageKind::Reply => {
                debug!(
                    %destination,
                    message_id = %envelope.message_id,
                    "dropping reply for disconnected destination"
                );
                self.pending.remove(&envelope.message_id);
            }

            MessageKind::Message if sender.kind().is_hub() => {
                let waiting = self.deferred_deliveries(&destination);
                if waiting >= self.config.max_deferred_per_address {
                    warn!(%destination, waiting, "refusing hub request; too many waiting on destination");
                    return Err(RouteError::DeferralLimit {
                        destination,
                        waiting,
                    });
                }

                debug!(%destination, message_id = %envelope.message_id, "deferring until destination connects");
                envelope.destination = envelope.destination.unqualified();
                self.defer(destination, Deferred::Deliver { envelope, sender });
            }

            MessageKind::Message => {
                let Some(fingerprint) = self.registry.fingerprint_of(&sender) else {
                    error!(
                        %sender,
                        %destination,
                        hops = ?envelope.hops,
                        "sender of undeliverable request is not connected"
                    );
                    return Ok(());
                };

                // Hand back the envelope as the sender sent it, so a resend
                // takes the same path
                envelope.hops.pop();
                info!(%sender, %destination, message_id = %envelope.message_id, "destination undeliverable");
                notify(
                    &self.registry,
                    &sender,
                    fingerprint,
                    HubFrame::Undeliverable {
                        resolved_destination: destination.clone(),
                        message: envelope,
                    },
                );
                self.when_deliverable_to(sender, fingerprint, destination);
            }
        }

        Ok(())
    }

    /// Tell the sender of a request the hub handles itself that it arrived.
    ///
    /// Called before the hub's runtime stamps its own hop.
    pub fn acknowledge_local(&self, envelope: &Envelope) -> Result<(), RouteError> {
        let sender = resolve_sender(&envelope.origin, envelope.hop_from_end(0))?;
        let Some(fingerprint) = self.registry.fingerprint_of(&sender) else {
            error!(%sender, hops = ?envelope.hops, "cannot acknowledge request from unregistered sender");
            return Ok(());
        };

        let receipt = DeliveryReceipt {
            envelope: envelope.clone(),
            to: self.hub_fingerprint,
            from: ReceiptSender {
                address: sender.clone(),
                fingerprint: Some(fingerprint),
            },
        };
        notify(&self.registry, &sender, fingerprint, HubFrame::Delivered { receipt });
        Ok(())
    }

    /// Register a connection and run whatever was waiting on its address.
    ///
    /// Returns the hub's own transactions whose deferred delivery failed.
    pub fn connect(
        &mut self,
        address: Address,
        fingerprint: Fingerprint,
        channel: Arc<dyn Channel<HubFrame>>,
    ) -> Vec<TransactionId> {
        let record = ConnectionRecord {
            channel,
            fingerprint,
        };
        if let Some(previous) = self.registry.insert(address.clone(), record) {
            debug!(%address, previous = %previous.fingerprint, "connection superseded");
        }
        info!(%address, %fingerprint, "context connected");

        let waiting = self.deferred.remove(&address).unwrap_or_default();
        let mut failed = Vec::new();
        for entry in waiting {
            match entry {
                Deferred::Deliver { envelope, sender } => {
                    let transaction_id = envelope.transaction_id;
                    if let Err(err) = self.deliver(envelope, &address, &sender) {
                        warn!(%address, %transaction_id, error = %err, "deferred delivery failed");
                        failed.push(transaction_id);
                    }
                }
                Deferred::NotifyDeliverable {
                    waiter,
                    waiter_fingerprint,
                } => {
                    notify(
                        &self.registry,
                        &waiter,
                        waiter_fingerprint,
                        HubFrame::Deliverable {
                            deliverable_to: address.clone(),
                        },
                    );
                }
            }
        }
        failed
    }

    /// End the session `fingerprint` at `address`.
    ///
    /// Spokes with requests delivered to the session are told it ended.
    /// Returns the hub's own transactions that must fail.
    pub fn disconnect(&mut self, address: &Address, fingerprint: Fingerprint) -> Vec<TransactionId> {
        if self.registry.remove_if_current(address, fingerprint) {
            info!(%address, %fingerprint, "context disconnected");
        }

        let orphaned = self.pending.remove_where(|receipt| receipt.to == fingerprint);
        let mut ended = Vec::new();
        for receipt in orphaned {
            let transaction_id = receipt.envelope.transaction_id;
            self.request_sources.remove(&transaction_id);

            if receipt.from.address.kind().is_hub() {
                ended.push(transaction_id);
                continue;
            }

            match receipt.from.fingerprint {
                Some(sender_fingerprint) => {
                    notify(
                        &self.registry,
                        &receipt.from.address,
                        sender_fingerprint,
                        HubFrame::Terminated { fingerprint },
                    );
                }
                None => debug!(
                    sender = %receipt.from.address,
                    %transaction_id,
                    "no session to tell about ended transaction"
                ),
            }
        }

        for entries in self.deferred.values_mut() {
            entries.retain(|entry| {
                !matches!(
                    entry,
                    Deferred::NotifyDeliverable { waiter_fingerprint, .. } if *waiter_fingerprint == fingerprint
                )
            });
        }
        self.deferred.retain(|_, entries| !entries.is_empty());

        // Requests still awaiting a reply keep their source until the reply
        // or the destination's session end
        let answerable: HashSet<TransactionId> = self
            .pending
            .entries()
            .iter()
            .filter(|receipt| receipt.from.fingerprint == Some(fingerprint))
            .map(|receipt| receipt.envelope.transaction_id)
            .collect();
        self.request_sources.retain(|transaction_id, (_, source_fingerprint)| {
            *source_fingerprint != fingerprint || answerable.contains(transaction_id)
        });

        ended
    }

    /// Apply the snapshot a spoke sends after (re)connecting
    pub fn reconcile(&mut self, address: &Address, fingerprint: Fingerprint, snapshot: SyncSnapshot) {
        let SyncSnapshot {
            pending_responses,
            pending_deliveries,
        } = snapshot;

        let (live, gone): (Vec<_>, Vec<_>) = pending_responses.into_iter().partition(|receipt| {
            receipt.to == self.hub_fingerprint || self.registry.is_live(receipt.to)
        });

        let readmitted = self.pending.add(live);
        debug!(%address, readmitted, ended = gone.len(), "reconciled pending responses");

        for receipt in gone {
            notify(
                &self.registry,
                address,
                fingerprint,
                HubFrame::Terminated {
                    fingerprint: receipt.to,
                },
            );
        }

        for target in pending_deliveries {
            self.when_deliverable_to(address.clone(), fingerprint, target);
        }
    }

    /// Tell `waiter` once `target` is connected; immediately if it already is
    pub fn when_deliverable_to(&mut self, waiter: Address, waiter_fingerprint: Fingerprint, target: Address) {
        let waiter_current = self.registry.fingerprint_of(&waiter) == Some(waiter_fingerprint);
        if waiter_current && self.registry.contains(&target) {
            notify(
                &self.registry,
                &waiter,
                waiter_fingerprint,
                HubFrame::Deliverable {
                    deliverable_to: target,
                },
            );
            return;
        }

        self.defer(
            target,
            Deferred::NotifyDeliverable {
                waiter,
                waiter_fingerprint,
            },
        );
    }

    fn defer(&mut self, target: Address, entry: Deferred) {
        self.deferred.entry(target).or_default().push_back(entry);
    }

    fn deferred_deliveries(&self, target: &Address) -> usize {
        self.deferred.get(target).map_or(0, |entries| {
            entries
                .iter()
                .filter(|entry| matches!(entry, Deferred::Deliver { .. }))
                .count()
        })
    }

    /// Push an envelope to a connected destination and record the delivery
    fn deliver(&mut self, envelope: Envelope, destination: &Address, sender: &Address) -> Result<(), RouteError> {
        let Some(record) = self.registry.get(destination) else {
            return Err(RouteError::ProtocolViolation(format!(
                "delivery to unregistered address {destination}"
            )));
        };
        let to = record.fingerprint;
        let channel = Arc::clone(&record.channel);

        let sender_fingerprint = if sender.kind().is_hub() {
            Some(self.hub_fingerprint)
        } else {
            self.registry.fingerprint_of(sender)
        };
        let receipt = DeliveryReceipt {
            envelope: envelope.clone(),
            to,
            from: ReceiptSender {
                address: sender.clone(),
                fingerprint: sender_fingerprint,
            },
        };

        channel.send(HubFrame::Incoming { message: envelope })?;
        debug!(%destination, %sender, message_id = %receipt.message_id(), "delivered");

        match receipt.envelope.message_type {
            MessageKind::Message => {
                self.pending.add([receipt.clone()]);
            }
            MessageKind::Reply => {
                self.pending.remove(&receipt.message_id());
            }
        }

        if !sender.kind().is_hub() {
            match sender_fingerprint {
                Some(fingerprint) => {
                    notify(&self.registry, sender, fingerprint, HubFrame::Delivered { receipt });
                }
                None => error!(
                    %sender,
                    %destination,
                    hops = ?receipt.envelope.hops,
                    "sender of delivered envelope is not connected"
                ),
            }
        }

        Ok(())
    }
}
