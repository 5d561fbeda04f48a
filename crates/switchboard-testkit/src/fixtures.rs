//! Address and envelope fixtures

use serde_json::{json, Value};

use switchboard_core::{Address, ContextKind, Envelope, HopTag};

/// Tab agent of `tab`, top frame
pub fn tab_agent(tab: u32) -> Address {
    Address::in_tab(ContextKind::ContentScript, tab, None)
}

/// Tab agent of a sub-frame of `tab`
pub fn frame_agent(tab: u32, frame: u32) -> Address {
    Address::in_tab(ContextKind::ContentScript, tab, Some(frame))
}

/// Devtools panel inspecting `tab`
pub fn devtools(tab: u32) -> Address {
    Address::in_tab(ContextKind::Devtools, tab, None)
}

/// The popup
pub fn popup() -> Address {
    Address::new(ContextKind::Popup)
}

/// The options page
pub fn options() -> Address {
    Address::new(ContextKind::Options)
}

/// Request with a small JSON payload
pub fn request(origin: Address, destination: Address, topic: &str) -> Envelope {
    Envelope::request(origin, destination, topic, json!({ "topic": topic }))
}

/// Request carrying `payload`
pub fn request_with(origin: Address, destination: Address, topic: &str, payload: Value) -> Envelope {
    Envelope::request(origin, destination, topic, payload)
}

/// Hop tag for a relaying context of `kind`
pub fn hop(kind: ContextKind, instance: &str) -> HopTag {
    HopTag::new(kind, instance)
}
