//! Session-scoped notifications
//!
//! Every notification names the session it is meant for. If the address has
//! since been taken over by a newer session, the notification is dropped: the
//! newer session never sent the request it would be about.

use tracing::{debug, warn};

use switchboard_core::{Address, Fingerprint, HubFrame};

use crate::registry::ConnectionRegistry;

/// Send `frame` to the session `fingerprint` at `address`; `false` if that
/// session is not connected or its channel refused the frame
pub fn notify(
    registry: &ConnectionRegistry,
    address: &Address,
    fingerprint: Fingerprint,
    frame: HubFrame,
) -> bool {
    let Some(record) = registry.get(address) else {
        debug!(%address, kind = frame.kind(), "notification target not connected");
        return false;
    };

    if record.fingerprint != fingerprint {
        debug!(
            %address,
            intended = %fingerprint,
            current = %record.fingerprint,
            kind = frame.kind(),
            "dropping notification for superseded session"
        );
        return false;
    }

    let kind = frame.kind();
    match record.channel.send(frame) {
        Ok(()) => true,
        Err(err) => {
            warn!(%address, kind, error = %err, "failed to notify");
            false
        }
    }
}
