//! Realm membership lifecycle (§4.5.2): `NotJoined -> Joining -> Joined
//! -> Leaving -> NotJoined`, plus the member set RealmAuth populates.

use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::info;

use dep2p_core::{NodeId, RealmId, RealmKey};

use crate::error::{RealmError, RealmResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealmState {
    NotJoined,
    Joining,
    Joined,
    Leaving,
}

/// Emitted on membership and lifecycle transitions; consumed via
/// [`RealmManager::subscribe`].
#[derive(Debug, Clone)]
pub enum RealmEvent {
    RealmJoined { realm_id: RealmId, name: String },
    RealmLeft { realm_id: RealmId },
    MemberJoined { realm_id: RealmId, peer: NodeId },
}

struct Joined {
    realm_id: RealmId,
    name: String,
    key: RealmKey,
    members: Arc<DashSet<NodeId>>,
}

/// Derives the human-facing Realm name from the key string a caller
/// passes to `join`: a conventional `-key` suffix is stripped (so
/// `"demo-realm-key"` joins as `"demo-realm"`), matching every
/// implementation's bootstrap-config convention of naming Realm keys
/// after the Realm they gate.
fn derive_realm_name(key_material: &str) -> String {
    key_material.strip_suffix("-key").unwrap_or(key_material).to_string()
}

/// Tracks this node's single current Realm membership and the set of
/// remote peers RealmAuth has admitted into it. The design admits
/// multiple simultaneous Realms in principle (`members`/
/// `find_realm_for_peer` already iterate a collection); today's policy
/// restricts a node to one Realm at a time (open question, see DESIGN.md).
pub struct RealmManager {
    state: RwLock<RealmState>,
    current: RwLock<Option<Joined>>,
    events_tx: broadcast::Sender<RealmEvent>,
    all_members: DashMap<RealmId, Arc<DashSet<NodeId>>>,
}

impl RealmManager {
    pub fn new() -> Self {
        let (events_tx, _) = broadcast::channel(256);
        Self {
            state: RwLock::new(RealmState::NotJoined),
            current: RwLock::new(None),
            events_tx,
            all_members: DashMap::new(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RealmEvent> {
        self.events_tx.subscribe()
    }

    pub fn state(&self) -> RealmState {
        *self.state.read()
    }

    /// Current Realm's human-readable name, or the empty string if not
    /// joined (§8 S2).
    pub fn realm(&self) -> String {
        self.current.read().as_ref().map(|j| j.name.clone()).unwrap_or_default()
    }

    pub fn realm_id(&self) -> Option<RealmId> {
        self.current.read().as_ref().map(|j| j.realm_id)
    }

    /// Join the Realm gated by `key_material` (passphrase or raw key
    /// string). Refuses if already joined, distinguishing the same key
    /// (`AlreadyJoined`) from a different one (`ConflictingRealm`).
    pub fn join(&self, key_material: &str) -> RealmResult<RealmId> {
        {
            let mut state = self.state.write();
            if *state == RealmState::Joined {
                let current = self.current.read();
                let joined = current.as_ref().expect("Joined state implies current is set");
                if joined.name == derive_realm_name(key_material) {
                    return Err(RealmError::AlreadyJoined);
                }
                return Err(RealmError::ConflictingRealm);
            }
            *state = RealmState::Joining;
        }

        let key = RealmKey::from_passphrase(key_material);
        let realm_id = dep2p_core::derive_realm_id(&key);
        let name = derive_realm_name(key_material);
        let members = Arc::clone(self.all_members.entry(realm_id).or_insert_with(|| Arc::new(DashSet::new())));

        *self.current.write() = Some(Joined { realm_id, name: name.clone(), key, members });
        *self.state.write() = RealmState::Joined;

        info!(realm = %name, realm_id = %realm_id, "joined realm");
        let _ = self.events_tx.send(RealmEvent::RealmJoined { realm_id, name });
        Ok(realm_id)
    }

    /// Leave the current Realm, clearing its member set.
    pub fn leave(&self) -> RealmResult<()> {
        *self.state.write() = RealmState::Leaving;
        let joined = self.current.write().take().ok_or(RealmError::NotJoined)?;
        joined.members.clear();
        *self.state.write() = RealmState::NotJoined;
        info!(realm_id = %joined.realm_id, "left realm");
        let _ = self.events_tx.send(RealmEvent::RealmLeft { realm_id: joined.realm_id });
        Ok(())
    }

    pub fn key(&self) -> RealmResult<RealmKey> {
        self.current.read().as_ref().map(|j| j.key.clone()).ok_or(RealmError::NotJoined)
    }

    /// Records `peer` as an authenticated member of `realm_id`, emitting
    /// `MemberJoined` the first time it is recorded.
    pub fn record_member(&self, realm_id: RealmId, peer: NodeId) {
        let members = Arc::clone(self.all_members.entry(realm_id).or_insert_with(|| Arc::new(DashSet::new())));
        if members.insert(peer) {
            let _ = self.events_tx.send(RealmEvent::MemberJoined { realm_id, peer });
        }
    }

    pub fn is_member(&self, realm_id: RealmId, peer: &NodeId) -> bool {
        self.all_members.get(&realm_id).is_some_and(|m| m.contains(peer))
    }

    /// All Realm ids that currently count `peer` as a member.
    pub fn find_realms_for_peer(&self, peer: &NodeId) -> Vec<RealmId> {
        self.all_members
            .iter()
            .filter(|entry| entry.value().contains(peer))
            .map(|entry| *entry.key())
            .collect()
    }

    pub fn members(&self, realm_id: RealmId) -> Vec<NodeId> {
        self.all_members
            .get(&realm_id)
            .map(|m| m.iter().map(|p| *p).collect())
            .unwrap_or_default()
    }
}

impl Default for RealmManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(b: u8) -> NodeId {
        NodeId::from_bytes([b; 32])
    }

    #[test]
    fn join_leave_join_matches_scenario_s2() {
        let mgr = RealmManager::new();
        assert_eq!(mgr.realm(), "");

        mgr.join("demo-realm-key").unwrap();
        assert_eq!(mgr.realm(), "demo-realm");

        assert!(matches!(mgr.join("demo-realm-key"), Err(RealmError::AlreadyJoined)));

        mgr.leave().unwrap();
        assert_eq!(mgr.realm(), "");

        mgr.join("new-realm-key").unwrap();
        assert_eq!(mgr.realm(), "new-realm");
    }

    #[test]
    fn joining_a_different_realm_while_joined_conflicts() {
        let mgr = RealmManager::new();
        mgr.join("realm-a-key").unwrap();
        assert!(matches!(mgr.join("realm-b-key"), Err(RealmError::ConflictingRealm)));
    }

    #[test]
    fn record_member_emits_once() {
        let mgr = RealmManager::new();
        let realm_id = mgr.join("team-key").unwrap();
        let mut events = mgr.subscribe();
        mgr.record_member(realm_id, peer(1));
        mgr.record_member(realm_id, peer(1));
        assert!(mgr.is_member(realm_id, &peer(1)));
        let first = events.try_recv();
        assert!(matches!(first, Ok(RealmEvent::MemberJoined { .. })));
        assert!(events.try_recv().is_err());
    }
}
