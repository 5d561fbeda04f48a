//! In-memory spokes driven against a hub
//!
//! Frames are moved by hand: nothing crosses a channel until [`pump`] runs,
//! so a test can inspect or withhold traffic between steps.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::Arc;

use switchboard_core::{Address, ContextKind, DeliveryReceipt, HubFrame, SpokeFrame};
use switchboard_endpoint::{EndpointRuntime, LinkEvent, Outbound, RelayOutbound, SpokeLink};
use switchboard_hub::{AmbientLocators, Connection, Hub};
use switchboard_testkit::RecordingChannel;

pub struct Spoke {
    pub runtime: Arc<EndpointRuntime>,
    pub link: Arc<SpokeLink>,
    pub up: Arc<RecordingChannel<SpokeFrame>>,
    pub down: Arc<RecordingChannel<HubFrame>>,
    pub connection: Connection,
    relay: Option<Arc<RelayOutbound>>,
    ambient: AmbientLocators,
    seen: Mutex<Vec<HubFrame>>,
}

impl Spoke {
    /// Extension page connecting under its own name
    pub fn extension(hub: &Hub, address: Address) -> Self {
        Self::connect(hub, Some(address.clone()), address, AmbientLocators::default(), None)
    }

    /// Tab agent of the top frame of `tab`
    pub fn tab(hub: &Hub, tab: u32) -> Self {
        Self::connect(
            hub,
            None,
            Address::new(ContextKind::ContentScript),
            AmbientLocators::tab(tab, 0),
            None,
        )
    }

    /// Tab agent forwarding for the page of `tab`
    pub fn tab_relaying(hub: &Hub, tab: u32, downstream: Arc<dyn Outbound>) -> Self {
        Self::connect(
            hub,
            None,
            Address::new(ContextKind::ContentScript),
            AmbientLocators::tab(tab, 0),
            Some(downstream),
        )
    }

    /// Extension page forwarding for the frames it embeds
    pub fn extension_relaying(hub: &Hub, address: Address, downstream: Arc<dyn Outbound>) -> Self {
        Self::connect(
            hub,
            Some(address.clone()),
            address,
            AmbientLocators::default(),
            Some(downstream),
        )
    }

    fn connect(
        hub: &Hub,
        endpoint: Option<Address>,
        address: Address,
        ambient: AmbientLocators,
        downstream: Option<Arc<dyn Outbound>>,
    ) -> Self {
        let link = Arc::new(SpokeLink::new(endpoint));
        let relay = downstream.map(|downstream| {
            Arc::new(RelayOutbound::new(address.kind(), link.clone(), downstream))
        });
        let outbound: Arc<dyn Outbound> = match &relay {
            Some(relay) => relay.clone() as Arc<dyn Outbound>,
            None => link.clone() as Arc<dyn Outbound>,
        };
        let runtime = Arc::new(EndpointRuntime::with_address(address, outbound));

        let up = RecordingChannel::new();
        let down = RecordingChannel::new();
        let connection = hub
            .accept(&link.handshake().unwrap(), ambient, down.clone())
            .unwrap();
        link.attach(up.clone()).unwrap();

        Self {
            runtime,
            link,
            up,
            down,
            connection,
            relay,
            ambient,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// The transport dropped; the hub sees the channel close
    pub fn drop_channel(&self, hub: &Hub) {
        hub.close(&self.connection);
        self.link.detach();
    }

    /// Open a fresh channel for the same session
    pub fn reconnect(&mut self, hub: &Hub) {
        self.up = RecordingChannel::new();
        self.down = RecordingChannel::new();
        self.connection = hub
            .accept(&self.link.handshake().unwrap(), self.ambient, self.down.clone())
            .unwrap();
        self.link.attach(self.up.clone()).unwrap();
    }

    /// Move queued frames to and from the hub; whether anything moved
    pub async fn exchange(&self, hub: &Hub) -> bool {
        let mut moved = false;
        for frame in self.up.take() {
            moved = true;
            hub.receive(&self.connection, frame).await;
        }
        for frame in self.down.take() {
            moved = true;
            self.seen.lock().push(frame.clone());
            self.on_hub_frame(frame).await;
        }
        moved
    }

    async fn on_hub_frame(&self, frame: HubFrame) {
        match self.link.on_frame(frame).unwrap() {
            Some(LinkEvent::Incoming(envelope)) => self.runtime.handle_message(envelope).await,
            Some(LinkEvent::Failed(envelopes)) => {
                for envelope in envelopes {
                    match &self.relay {
                        Some(relay) => relay.fail(&self.runtime, &envelope),
                        None => {
                            self.runtime.terminate_transaction(envelope.transaction_id);
                        }
                    }
                }
            }
            None => {}
        }
    }

    /// How many hub frames of `kind` this spoke received
    pub fn seen(&self, kind: &str) -> usize {
        self.seen.lock().iter().filter(|frame| frame.kind() == kind).count()
    }

    /// Receipts from `delivered` notifications
    pub fn receipts(&self) -> Vec<DeliveryReceipt> {
        self.seen
            .lock()
            .iter()
            .filter_map(|frame| match frame {
                HubFrame::Delivered { receipt } => Some(receipt.clone()),
                _ => None,
            })
            .collect()
    }
}

/// Let spawned sends run up to their next suspension point
pub async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

/// Exchange frames until no spoke has anything left to move
pub async fn pump(hub: &Hub, spokes: &[&Spoke]) {
    loop {
        settle().await;
        let mut moved = false;
        for spoke in spokes {
            moved |= spoke.exchange(hub).await;
        }
        if !moved {
            break;
        }
    }
}
