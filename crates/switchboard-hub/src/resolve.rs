//! Sender and destination resolution
//!
//! Page scripts and frames have no channel of their own. An envelope from
//! one is attributed to the context that forwarded it, and an envelope for
//! one is routed to that forwarder:
//!
//! - a page script or frame in a tab resolves to the tab agent of that tab;
//! - a frame embedded in an extension page resolves to that page, found
//!   from the hop the page stamped while relaying.

use switchboard_core::{parse_hop, Address, ContextKind, Envelope, HopParseError};

/// Resolve who sent an envelope.
///
/// `forwarded_by` is the hop of the context that handed the envelope to the
/// hub, if any. `origin` must already carry the locators linked to the
/// connection it arrived on.
pub fn resolve_sender(origin: &Address, forwarded_by: Option<&str>) -> Result<Address, HopParseError> {
    if origin.kind() == ContextKind::Frame {
        if let Some(raw) = forwarded_by {
            let hop = parse_hop(raw)?;
            if hop.forwards_frames() {
                let page = Address::new(hop.kind);
                // A devtools page is registered under the tab it inspects
                return Ok(if hop.kind.is_tab_scoped() {
                    page.with_locators(origin.primary(), None)
                } else {
                    page
                });
            }
        }
    }

    Ok(via_tab_agent(origin))
}

/// Resolve the registry address an envelope must be delivered to.
///
/// Replies to a page script or frame go back through the extension page
/// that forwarded the request when `request_source` names one. Otherwise a
/// reply addresses the tab of whoever sent it unless it names a tab itself.
pub fn resolve_destination(envelope: &Envelope, request_source: Option<&Address>) -> Address {
    let destination = &envelope.destination;

    if envelope.is_reply() && destination.kind().is_page_context() {
        if let Some(source) = request_source.filter(|source| source.kind().is_extension_page()) {
            return source.clone();
        }
    }

    let resolved = via_tab_agent(destination);
    if !resolved.kind().is_tab_scoped() {
        return resolved.unqualified();
    }

    match destination.primary() {
        Some(_) => resolved,
        None => resolved.with_locators(envelope.origin.primary(), None),
    }
}

fn via_tab_agent(address: &Address) -> Address {
    if address.kind().is_page_context() {
        address.clone().with_kind(ContextKind::ContentScript)
    } else {
        address.clone()
    }
}
