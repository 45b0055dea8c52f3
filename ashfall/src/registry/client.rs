use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::net::SessionHandle;

/// Transport-layer identity of one connected peer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub client_id: i32,
    pub hash: String,
    /// Character currently controlled; 0 until the character join lands.
    pub character_id: i32,
}

struct ClientEntry {
    info: ClientInfo,
    session: Arc<SessionHandle>,
}

#[derive(Default)]
struct ClientMaps {
    by_id: HashMap<i32, ClientEntry>,
    // Session identity -> client id, maintained under the same lock as the
    // primary map so the two can never disagree.
    by_session: HashMap<u64, i32>,
}

/// Connected-client registry. Queries hand out copies of `ClientInfo` and
/// shared handles to the session; nothing here ever exposes a reference
/// into the map.
#[derive(Default)]
pub struct ClientRegistry {
    maps: RwLock<ClientMaps>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update a client. Re-registering an existing id (a
    /// reconnect) swaps the session and drops the stale reverse-index row.
    pub fn register(&self, info: ClientInfo, session: Arc<SessionHandle>) {
        let mut guard = self.maps.write();
        let maps = &mut *guard;
        let client_id = info.client_id;
        if let Some(previous) = maps.by_id.get(&client_id) {
            let stale = previous.session.session_id();
            maps.by_session.remove(&stale);
        }
        maps.by_session.insert(session.session_id(), client_id);
        maps.by_id.insert(client_id, ClientEntry { info, session });
    }

    pub fn set_character(&self, client_id: i32, character_id: i32) -> bool {
        let mut maps = self.maps.write();
        match maps.by_id.get_mut(&client_id) {
            Some(entry) => {
                entry.info.character_id = character_id;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, client_id: i32) -> Option<ClientInfo> {
        self.maps.read().by_id.get(&client_id).map(|e| e.info.clone())
    }

    pub fn session_for(&self, client_id: i32) -> Option<Arc<SessionHandle>> {
        self.maps
            .read()
            .by_id
            .get(&client_id)
            .map(|e| e.session.clone())
    }

    /// Resolve a client id from a session identity; 0 when unknown.
    pub fn client_id_by_session(&self, session_id: u64) -> i32 {
        self.maps
            .read()
            .by_session
            .get(&session_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn remove(&self, client_id: i32) -> Option<ClientInfo> {
        let mut maps = self.maps.write();
        let entry = maps.by_id.remove(&client_id)?;
        maps.by_session.remove(&entry.session.session_id());
        Some(entry.info)
    }

    /// Remove whatever client is bound to this session. Returns the client
    /// id when one was bound; repeated calls are harmless.
    pub fn remove_by_session(&self, session_id: u64) -> Option<i32> {
        let mut maps = self.maps.write();
        let client_id = maps.by_session.remove(&session_id)?;
        maps.by_id.remove(&client_id);
        Some(client_id)
    }

    pub fn list(&self) -> Vec<ClientInfo> {
        self.maps.read().by_id.values().map(|e| e.info.clone()).collect()
    }

    /// Every live session handle, for broadcasts.
    pub fn sessions(&self) -> Vec<Arc<SessionHandle>> {
        self.maps
            .read()
            .by_id
            .values()
            .map(|e| e.session.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.maps.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.read().by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::test_handle;

    fn info(client_id: i32) -> ClientInfo {
        ClientInfo {
            client_id,
            hash: format!("hash-{client_id}"),
            character_id: 0,
        }
    }

    #[test]
    fn register_and_lookup_both_ways() {
        let registry = ClientRegistry::new();
        let (session, _rx) = test_handle(11);
        registry.register(info(5), session);

        assert_eq!(registry.get(5).unwrap().hash, "hash-5");
        assert_eq!(registry.client_id_by_session(11), 5);
        assert_eq!(registry.client_id_by_session(99), 0);
    }

    #[test]
    fn reconnect_swaps_session_atomically() {
        let registry = ClientRegistry::new();
        let (first, _rx1) = test_handle(11);
        let (second, _rx2) = test_handle(12);
        registry.register(info(5), first);
        registry.register(info(5), second);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.client_id_by_session(11), 0);
        assert_eq!(registry.client_id_by_session(12), 5);
    }

    #[test]
    fn remove_by_session_is_idempotent() {
        let registry = ClientRegistry::new();
        let (session, _rx) = test_handle(11);
        registry.register(info(5), session);

        assert_eq!(registry.remove_by_session(11), Some(5));
        assert_eq!(registry.remove_by_session(11), None);
        assert!(registry.get(5).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn set_character_updates_copy_queries() {
        let registry = ClientRegistry::new();
        let (session, _rx) = test_handle(11);
        registry.register(info(5), session);
        assert!(registry.set_character(5, 42));
        assert_eq!(registry.get(5).unwrap().character_id, 42);
        assert!(!registry.set_character(6, 42));
    }
}
