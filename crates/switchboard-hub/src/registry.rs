//! Connection registry
//!
//! At most one live connection per address. A context that reloads opens a
//! new connection under a new fingerprint before the old one has been seen
//! to close, so removal is conditional on the fingerprint still matching.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use switchboard_core::{Address, Channel, Fingerprint, HubFrame};

/// The live connection at one address
#[derive(Clone)]
pub struct ConnectionRecord {
    /// Channel to the connected context
    pub channel: Arc<dyn Channel<HubFrame>>,
    /// Session fingerprint of the connected context
    pub fingerprint: Fingerprint,
}

impl std::fmt::Debug for ConnectionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRecord")
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

/// Address to connection map
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<Address, ConnectionRecord>,
}

impl ConnectionRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection, returning the one it supersedes
    pub fn insert(&mut self, address: Address, record: ConnectionRecord) -> Option<ConnectionRecord> {
        self.connections.insert(address, record)
    }

    /// Connection at `address`
    pub fn get(&self, address: &Address) -> Option<&ConnectionRecord> {
        self.connections.get(address)
    }

    /// Fingerprint of the session at `address`
    pub fn fingerprint_of(&self, address: &Address) -> Option<Fingerprint> {
        self.connections.get(address).map(|record| record.fingerprint)
    }

    /// Whether anything is connected at `address`
    pub fn contains(&self, address: &Address) -> bool {
        self.connections.contains_key(address)
    }

    /// Remove the connection at `address` if it still belongs to `fingerprint`
    pub fn remove_if_current(&mut self, address: &Address, fingerprint: Fingerprint) -> bool {
        match self.connections.get(address) {
            Some(record) if record.fingerprint == fingerprint => {
                self.connections.remove(address);
                true
            }
            Some(record) => {
                debug!(
                    %address,
                    closing = %fingerprint,
                    current = %record.fingerprint,
                    "ignoring close of superseded session"
                );
                false
            }
            None => false,
        }
    }

    /// Whether any connection belongs to `fingerprint`
    pub fn is_live(&self, fingerprint: Fingerprint) -> bool {
        self.connections
            .values()
            .any(|record| record.fingerprint == fingerprint)
    }

    /// Connected addresses
    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.connections.keys()
    }

    /// Number of connections
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether nothing is connected
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_testkit::{tab_agent, RecordingChannel};

    fn record(fingerprint: Fingerprint) -> ConnectionRecord {
        ConnectionRecord {
            channel: RecordingChannel::<HubFrame>::new(),
            fingerprint,
        }
    }

    #[test]
    fn test_reconnect_supersedes() {
        let mut registry = ConnectionRegistry::new();
        let (old, new) = (Fingerprint::fresh(), Fingerprint::fresh());

        assert!(registry.insert(tab_agent(5), record(old)).is_none());
        let replaced = registry.insert(tab_agent(5), record(new)).unwrap();
        assert_eq!(replaced.fingerprint, old);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.fingerprint_of(&tab_agent(5)), Some(new));
    }

    #[test]
    fn test_stale_close_keeps_current_occupant() {
        let mut registry = ConnectionRegistry::new();
        let (old, new) = (Fingerprint::fresh(), Fingerprint::fresh());
        registry.insert(tab_agent(5), record(old));
        registry.insert(tab_agent(5), record(new));

        assert!(!registry.remove_if_current(&tab_agent(5), old));
        assert!(registry.contains(&tab_agent(5)));
        assert!(!registry.is_live(old));

        assert!(registry.remove_if_current(&tab_agent(5), new));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_locators_are_part_of_the_key() {
        let mut registry = ConnectionRegistry::new();
        registry.insert(tab_agent(5), record(Fingerprint::fresh()));
        assert!(!registry.contains(&tab_agent(6)));
        assert!(!registry.contains(&tab_agent(5).unqualified()));
    }
}
