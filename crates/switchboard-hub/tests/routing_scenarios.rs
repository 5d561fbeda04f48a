//! End-to-end Routing Tests
//!
//! Hub, spokes and forwarded page contexts exchanging requests over
//! in-memory channels.

mod common;

use assert_matches::assert_matches;
use serde_json::json;
use std::sync::Arc;

use common::{pump, settle, Spoke};
use switchboard_core::{Address, ContextKind, Envelope, HandlerFault, HopTag, RouteError};
use switchboard_endpoint::{adopt_forwarded, EndpointError, EndpointRuntime, IncomingMessage};
use switchboard_hub::{Hub, HubConfig};
use switchboard_testkit::{init_test_tracing, options, popup, tab_agent, RecordingOutbound};

fn hub() -> Hub {
    init_test_tracing();
    Hub::new(HubConfig::default()).unwrap()
}

// ============================================================================
// Deliverability
// ============================================================================

#[tokio::test]
async fn request_to_absent_context_is_resent_once_it_connects() {
    let hub = hub();
    let sender = Spoke::extension(&hub, popup());

    let runtime = sender.runtime.clone();
    let call = tokio::spawn(async move { runtime.send("ping", json!({ "n": 1 }), options()).await });
    pump(&hub, &[&sender]).await;

    assert_eq!(sender.seen("undeliverable"), 1);
    assert_eq!(sender.link.undelivered(), 1);
    assert!(!call.is_finished());

    let receiver = Spoke::extension(&hub, options());
    receiver.runtime.on_message("ping", |message: IncomingMessage| async move {
        Ok::<_, HandlerFault>(json!({ "echo": message.payload }))
    });
    pump(&hub, &[&sender, &receiver]).await;

    let reply = call.await.unwrap().unwrap();
    assert_eq!(reply, json!({ "echo": { "n": 1 } }));

    assert_eq!(sender.seen("undeliverable"), 1);
    assert_eq!(sender.seen("deliverable"), 1);
    assert_eq!(sender.link.undelivered(), 0);
    assert!(sender.link.pending().is_empty());
    assert!(hub.pending_receipts().is_empty());
}

#[tokio::test]
async fn hub_request_waits_for_its_destination() {
    let hub = hub();

    let sender = hub.clone();
    let call = tokio::spawn(async move { sender.send("greet", json!("hi"), tab_agent(9)).await });
    settle().await;
    assert_eq!(hub.deferred_for(&tab_agent(9)), 1);

    let tab = Spoke::tab(&hub, 9);
    tab.runtime.on_message("greet", |message: IncomingMessage| async move {
        let greeting = message.payload.as_str().unwrap_or_default().to_string();
        Ok::<_, HandlerFault>(json!(format!("{greeting} back")))
    });
    pump(&hub, &[&tab]).await;

    assert_eq!(call.await.unwrap().unwrap(), json!("hi back"));
    assert_eq!(hub.deferred_for(&tab_agent(9)), 0);
    assert!(hub.pending_receipts().is_empty());
}

#[tokio::test]
async fn answered_hub_request_leaves_no_receipt() {
    let hub = hub();
    let tab = Spoke::tab(&hub, 2);
    tab.runtime.on_message("inspect", |_: IncomingMessage| async move {
        Ok::<_, HandlerFault>(json!("ok"))
    });

    let sender = hub.clone();
    let call = tokio::spawn(async move { sender.send("inspect", json!(null), tab_agent(2)).await });
    settle().await;
    assert_eq!(hub.pending_receipts().len(), 1);

    pump(&hub, &[&tab]).await;
    assert_eq!(call.await.unwrap().unwrap(), json!("ok"));
    assert!(hub.pending_receipts().is_empty());

    // The tab leaving later has nothing to fail
    tab.drop_channel(&hub);
    assert_eq!(hub.runtime().open_transactions(), 0);
}

#[tokio::test]
async fn hub_requests_beyond_the_deferral_limit_fail() {
    init_test_tracing();
    let hub = Hub::new(HubConfig {
        max_deferred_per_address: 1,
        ..HubConfig::default()
    })
    .unwrap();

    let sender = hub.clone();
    let first = tokio::spawn(async move { sender.send("a", json!(null), tab_agent(1)).await });
    settle().await;

    let refused = hub.send("b", json!(null), tab_agent(1)).await;
    assert_matches!(
        refused,
        Err(EndpointError::Route(RouteError::DeferralLimit { waiting: 1, .. }))
    );
    assert_eq!(hub.runtime().open_transactions(), 1);

    // The accepted request is still delivered
    let tab = Spoke::tab(&hub, 1);
    tab.runtime.on_message("a", |_: IncomingMessage| async move {
        Ok::<_, HandlerFault>(json!("first"))
    });
    pump(&hub, &[&tab]).await;
    assert_eq!(first.await.unwrap().unwrap(), json!("first"));
}

#[tokio::test]
async fn hub_must_name_a_tab() {
    let hub = hub();
    let result = hub
        .send("x", json!(null), Address::new(ContextKind::ContentScript))
        .await;
    assert_matches!(result, Err(EndpointError::ProtocolViolation(_)));
    assert_eq!(hub.runtime().open_transactions(), 0);
}

// ============================================================================
// Session end
// ============================================================================

#[tokio::test]
async fn session_end_fails_outstanding_request() {
    let hub = hub();
    let sender = Spoke::extension(&hub, popup());
    let receiver = Spoke::extension(&hub, options());

    let runtime = sender.runtime.clone();
    let call = tokio::spawn(async move { runtime.send("slow", json!(null), options()).await });
    pump(&hub, &[&sender]).await;

    // Delivered, never answered
    assert_eq!(receiver.down.len(), 1);
    assert_eq!(hub.pending_receipts().len(), 1);
    assert_eq!(sender.link.pending().len(), 1);

    receiver.drop_channel(&hub);
    pump(&hub, &[&sender]).await;

    assert_matches!(call.await.unwrap(), Err(EndpointError::SessionEnded { .. }));
    assert_eq!(sender.seen("terminated"), 1);
    assert!(hub.pending_receipts().is_empty());
    assert!(sender.link.pending().is_empty());
}

#[tokio::test]
async fn session_end_fails_hub_request() {
    let hub = hub();
    let tab = Spoke::tab(&hub, 5);

    let sender = hub.clone();
    let call = tokio::spawn(async move { sender.send("inspect", json!(null), tab_agent(5)).await });
    settle().await;
    assert_eq!(tab.down.len(), 1);

    tab.drop_channel(&hub);
    assert_matches!(call.await.unwrap(), Err(EndpointError::SessionEnded { .. }));
    assert_eq!(hub.runtime().open_transactions(), 0);
}

#[tokio::test]
async fn handler_fault_is_returned_to_sender() {
    let hub = hub();
    let sender = Spoke::extension(&hub, popup());
    let tab = Spoke::tab(&hub, 2);
    tab.runtime.on_message("fail", |_: IncomingMessage| async move {
        Err::<serde_json::Value, _>(HandlerFault::new("Refused", "not today"))
    });

    let runtime = sender.runtime.clone();
    let call = tokio::spawn(async move { runtime.send("fail", json!(null), tab_agent(2)).await });
    pump(&hub, &[&sender, &tab]).await;

    assert_matches!(
        call.await.unwrap(),
        Err(EndpointError::Remote(fault)) if fault.name == "Refused"
    );
    assert!(hub.pending_receipts().is_empty());
}

// ============================================================================
// Forwarded contexts
// ============================================================================

#[tokio::test]
async fn frame_in_extension_page_is_answered_through_that_page() {
    let hub = hub();
    let frame_up = RecordingOutbound::new();
    let frame_down = RecordingOutbound::new();
    let frame = Arc::new(EndpointRuntime::new(ContextKind::Frame, frame_up.clone()));

    let host = Spoke::extension_relaying(&hub, popup(), frame_down.clone());
    let tab = Spoke::tab(&hub, 4);
    tab.runtime.on_message("whoami", |message: IncomingMessage| async move {
        Ok::<_, HandlerFault>(json!(message.sender.to_string()))
    });

    let runtime = frame.clone();
    let call = tokio::spawn(async move { runtime.send("whoami", json!(null), tab_agent(4)).await });
    settle().await;

    let mut sent = frame_up.take();
    assert_eq!(sent.len(), 1);
    host.runtime
        .handle_message(adopt_forwarded(ContextKind::Popup, sent.remove(0)))
        .await;
    pump(&hub, &[&host, &tab]).await;

    // The hub attributed the request to the popup
    let receipts = host.receipts();
    assert_eq!(receipts.len(), 1);
    assert_eq!(receipts[0].from.address, popup());
    assert!(host.link.pending().is_empty());

    let mut returned = frame_down.take();
    assert_eq!(returned.len(), 1);
    let reply = returned.remove(0);
    assert!(reply.is_reply());
    frame.handle_message(reply).await;

    assert_eq!(call.await.unwrap().unwrap(), json!("iframe"));
}

#[tokio::test]
async fn page_script_request_is_answered_through_tab_agent() {
    let hub = hub();
    hub.on_message("whoami", |message: IncomingMessage| async move {
        Ok::<_, HandlerFault>(json!(message.sender.to_string()))
    });

    let page_up = RecordingOutbound::new();
    let page_down = RecordingOutbound::new();
    let page = Arc::new(EndpointRuntime::new(ContextKind::Window, page_up.clone()));
    let tab = Spoke::tab_relaying(&hub, 6, page_down.clone());

    let runtime = page.clone();
    let call = tokio::spawn(async move { runtime.send("whoami", json!(null), Address::hub()).await });
    settle().await;

    for envelope in page_up.take() {
        tab.runtime
            .handle_message(adopt_forwarded(ContextKind::ContentScript, envelope))
            .await;
    }
    pump(&hub, &[&tab]).await;

    // Acknowledged by the hub itself, on behalf of the page
    let receipts = tab.receipts();
    assert_eq!(receipts.len(), 1);
    assert_eq!(receipts[0].to, hub.fingerprint());
    assert_eq!(receipts[0].from.address, tab_agent(6));

    for envelope in page_down.take() {
        page.handle_message(envelope).await;
    }
    assert_eq!(call.await.unwrap().unwrap(), json!("window@6"));
    assert!(tab.link.pending().is_empty());
}

#[tokio::test]
async fn page_cannot_claim_another_identity() {
    let hub = hub();
    hub.on_message("whoami", |message: IncomingMessage| async move {
        Ok::<_, HandlerFault>(json!(message.sender.to_string()))
    });

    let page_down = RecordingOutbound::new();
    let tab = Spoke::tab_relaying(&hub, 3, page_down.clone());

    // A page script posing as the tab agent of another tab
    let mut forged = Envelope::request(
        Address::in_tab(ContextKind::ContentScript, 99, None),
        Address::hub(),
        "whoami",
        json!(null),
    );
    forged.push_hop(&HopTag::new(ContextKind::Window, "page"));
    tab.runtime
        .handle_message(adopt_forwarded(ContextKind::ContentScript, forged))
        .await;
    pump(&hub, &[&tab]).await;

    // Answered as the page script of tab 3, and only to tab 3
    let returned = page_down.take();
    assert_eq!(returned.len(), 1);
    assert_eq!(returned[0].destination, Address::new(ContextKind::Window));
    assert_eq!(returned[0].payload, json!("window@3"));
}

#[tokio::test]
async fn cancelled_forwarded_request_reaches_the_page() {
    let hub = hub();
    let frame_up = RecordingOutbound::new();
    let frame_down = RecordingOutbound::new();
    let frame = Arc::new(EndpointRuntime::new(ContextKind::Frame, frame_up.clone()));
    let host = Spoke::extension_relaying(&hub, options(), frame_down.clone());
    let tab = Spoke::tab(&hub, 8);

    let runtime = frame.clone();
    let call = tokio::spawn(async move { runtime.send("slow", json!(null), tab_agent(8)).await });
    settle().await;

    let envelope = frame_up.take().remove(0);
    let transaction_id = envelope.transaction_id;
    host.runtime
        .handle_message(adopt_forwarded(ContextKind::Options, envelope))
        .await;
    pump(&hub, &[&host]).await;
    assert_eq!(tab.down.len(), 1);

    tab.drop_channel(&hub);
    pump(&hub, &[&host]).await;

    // The host forwards the failure down instead of ending a local transaction
    assert_eq!(frame_down.cancelled(), vec![transaction_id]);
    assert!(frame.end_transaction(transaction_id));
    assert_matches!(call.await.unwrap(), Err(EndpointError::TransactionEnded { .. }));
}
