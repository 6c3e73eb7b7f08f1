//! The resource manager: an arena of scopes plus the reservation and
//! release operations that keep their counters consistent.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::error::{ResourceError, ResourceResult};
use crate::limit::{Limit, ResourceKind};
use crate::priority::Priority;
use crate::scope::{Scope, ScopeId, ScopeKind};

const ALL_KINDS: [ResourceKind; 8] = [
    ResourceKind::StreamsTotal,
    ResourceKind::StreamsInbound,
    ResourceKind::StreamsOutbound,
    ResourceKind::ConnsTotal,
    ResourceKind::ConnsInbound,
    ResourceKind::ConnsOutbound,
    ResourceKind::FileDescriptors,
    ResourceKind::Memory,
];

/// Owns every [`Scope`] in the System ⊃ {Transient, Service, Protocol,
/// Peer} ⊃ Connection ⊃ Stream hierarchy and enforces the priority-aware
/// reservation contract described in the module-level docs.
///
/// Reservations across a scope's whole ancestor chain are checked and
/// applied under a single short-held lock: cheap, never crosses a
/// suspension point, and keeps "usage accumulates upward" trivially
/// consistent without per-scope lock ordering.
pub struct ResourceManager {
    scopes: DashMap<ScopeId, Arc<Scope>>,
    next_id: AtomicU64,
    reservation_lock: Mutex<()>,
    system: ScopeId,
    transient: ScopeId,
}

impl ResourceManager {
    pub fn new(system_limit: Limit, transient_limit: Limit) -> Self {
        let scopes = DashMap::new();
        let next_id = AtomicU64::new(2);

        let system_id = ScopeId(0);
        scopes.insert(
            system_id,
            Arc::new(Scope::new(
                system_id,
                ScopeKind::System,
                "system".to_string(),
                None,
                system_limit,
            )),
        );

        let transient_id = ScopeId(1);
        scopes.insert(
            transient_id,
            Arc::new(Scope::new(
                transient_id,
                ScopeKind::Transient,
                "transient".to_string(),
                None,
                transient_limit,
            )),
        );

        Self {
            scopes,
            next_id,
            reservation_lock: Mutex::new(()),
            system: system_id,
            transient: transient_id,
        }
    }

    pub fn system_scope(&self) -> ScopeId {
        self.system
    }

    pub fn transient_scope(&self) -> ScopeId {
        self.transient
    }

    /// Create a new scope as a child of `parent`. Fails if `parent` is
    /// unknown or already closed.
    pub fn create_child_scope(
        &self,
        parent: ScopeId,
        kind: ScopeKind,
        label: impl Into<String>,
        limit: Limit,
    ) -> ResourceResult<ScopeId> {
        self.require_open(parent)?;
        let id = ScopeId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.scopes.insert(
            id,
            Arc::new(Scope::new(id, kind, label.into(), Some(parent), limit)),
        );
        Ok(id)
    }

    pub fn scope(&self, id: ScopeId) -> ResourceResult<Arc<Scope>> {
        self.scopes
            .get(&id)
            .map(|entry| entry.clone())
            .ok_or(ResourceError::UnknownScope(id))
    }

    fn require_open(&self, id: ScopeId) -> ResourceResult<Arc<Scope>> {
        let scope = self.scope(id)?;
        if scope.is_closed() {
            return Err(ResourceError::ScopeClosed(id));
        }
        Ok(scope)
    }

    /// `id` followed by every open ancestor, nearest first.
    fn chain(&self, id: ScopeId) -> ResourceResult<Vec<Arc<Scope>>> {
        let mut out = Vec::new();
        let mut current = Some(id);
        while let Some(cur) = current {
            let scope = self.require_open(cur)?;
            current = scope.parent();
            out.push(scope);
        }
        Ok(out)
    }

    /// Reserve `amount` of `kind` at `scope`, propagating the check and
    /// the increment up through every open ancestor. All-or-nothing:
    /// if any scope in the chain would breach its limit, nothing is
    /// mutated and `ResourceLimitExceeded` is returned.
    ///
    /// Never suspends: this takes a plain sync lock, not an async one.
    pub fn reserve(
        &self,
        scope: ScopeId,
        kind: ResourceKind,
        amount: i64,
        priority: Priority,
    ) -> ResourceResult<()> {
        let _guard = self.reservation_lock.lock();
        let chain = self.chain(scope)?;
        for s in &chain {
            let current = s.usage(kind);
            let limit = s.limit.get(kind);
            if !priority.allows(current, amount, limit) {
                return Err(ResourceError::LimitExceeded {
                    scope: s.id,
                    kind,
                    requested: amount,
                    current,
                    limit,
                });
            }
        }
        for s in &chain {
            s.counters.add(kind, amount);
        }
        Ok(())
    }

    /// Release `amount` of `kind` previously reserved at `scope`,
    /// propagating the decrement up through the ancestor chain.
    pub fn release(&self, scope: ScopeId, kind: ResourceKind, amount: i64) -> ResourceResult<()> {
        let _guard = self.reservation_lock.lock();
        let chain = self.chain(scope)?;
        for s in &chain {
            s.counters.add(kind, -amount);
        }
        Ok(())
    }

    pub fn reserve_memory(&self, scope: ScopeId, bytes: i64, priority: Priority) -> ResourceResult<()> {
        self.reserve(scope, ResourceKind::Memory, bytes, priority)
    }

    pub fn release_memory(&self, scope: ScopeId, bytes: i64) -> ResourceResult<()> {
        self.release(scope, ResourceKind::Memory, bytes)
    }

    pub fn reserve_stream_inbound(&self, scope: ScopeId, priority: Priority) -> ResourceResult<()> {
        self.reserve(scope, ResourceKind::StreamsInbound, 1, priority)?;
        self.reserve(scope, ResourceKind::StreamsTotal, 1, priority)
    }

    pub fn reserve_stream_outbound(&self, scope: ScopeId, priority: Priority) -> ResourceResult<()> {
        self.reserve(scope, ResourceKind::StreamsOutbound, 1, priority)?;
        self.reserve(scope, ResourceKind::StreamsTotal, 1, priority)
    }

    pub fn release_stream_inbound(&self, scope: ScopeId) -> ResourceResult<()> {
        self.release(scope, ResourceKind::StreamsInbound, 1)?;
        self.release(scope, ResourceKind::StreamsTotal, 1)
    }

    pub fn release_stream_outbound(&self, scope: ScopeId) -> ResourceResult<()> {
        self.release(scope, ResourceKind::StreamsOutbound, 1)?;
        self.release(scope, ResourceKind::StreamsTotal, 1)
    }

    pub fn reserve_conn_inbound(&self, scope: ScopeId, priority: Priority) -> ResourceResult<()> {
        self.reserve(scope, ResourceKind::ConnsInbound, 1, priority)?;
        self.reserve(scope, ResourceKind::ConnsTotal, 1, priority)
    }

    pub fn reserve_conn_outbound(&self, scope: ScopeId, priority: Priority) -> ResourceResult<()> {
        self.reserve(scope, ResourceKind::ConnsOutbound, 1, priority)?;
        self.reserve(scope, ResourceKind::ConnsTotal, 1, priority)
    }

    pub fn release_conn_inbound(&self, scope: ScopeId) -> ResourceResult<()> {
        self.release(scope, ResourceKind::ConnsInbound, 1)?;
        self.release(scope, ResourceKind::ConnsTotal, 1)
    }

    pub fn release_conn_outbound(&self, scope: ScopeId) -> ResourceResult<()> {
        self.release(scope, ResourceKind::ConnsOutbound, 1)?;
        self.release(scope, ResourceKind::ConnsTotal, 1)
    }

    /// Tear down a scope: releases everything it still holds back up
    /// its ancestor chain and marks it closed. Idempotent — a second
    /// call on an already-closed scope is a no-op, never a panic.
    pub fn close(&self, scope: ScopeId) -> ResourceResult<()> {
        let _guard = self.reservation_lock.lock();
        let Some(entry) = self.scopes.get(&scope) else {
            return Ok(());
        };
        let scope_arc = entry.clone();
        drop(entry);

        if scope_arc.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(parent) = scope_arc.parent() {
            if let Ok(parent_chain) = self.chain(parent) {
                for kind in ALL_KINDS {
                    let amount = scope_arc.usage(kind);
                    if amount != 0 {
                        for p in &parent_chain {
                            p.counters.add(kind, -amount);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Move `scope`'s currently-accounted usage from its old parent
    /// chain to `new_parent`'s chain and repoint it there, atomically.
    /// Used to promote a connection from the Transient scope to a Peer
    /// scope once its first stream completes RealmAuth.
    pub fn reparent(&self, scope: ScopeId, new_parent: ScopeId) -> ResourceResult<()> {
        let _guard = self.reservation_lock.lock();
        let scope_arc = self.require_open(scope)?;
        self.require_open(new_parent)?;

        let old_parent_chain = match scope_arc.parent() {
            Some(p) => self.chain(p)?,
            None => Vec::new(),
        };
        let new_parent_chain = self.chain(new_parent)?;

        for kind in ALL_KINDS {
            let amount = scope_arc.usage(kind);
            if amount == 0 {
                continue;
            }
            for p in &new_parent_chain {
                let current = p.usage(kind);
                let limit = p.limit.get(kind);
                if current + amount > limit {
                    return Err(ResourceError::LimitExceeded {
                        scope: p.id,
                        kind,
                        requested: amount,
                        current,
                        limit,
                    });
                }
            }
        }

        for kind in ALL_KINDS {
            let amount = scope_arc.usage(kind);
            if amount == 0 {
                continue;
            }
            for p in &old_parent_chain {
                p.counters.add(kind, -amount);
            }
            for p in &new_parent_chain {
                p.counters.add(kind, amount);
            }
        }

        *scope_arc.parent.write() = Some(new_parent);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager_with_limit(n: i64) -> (ResourceManager, ScopeId) {
        let mut limit = Limit::UNLIMITED;
        limit.conns_total = n;
        limit.conns_inbound = n;
        let mgr = ResourceManager::new(limit, Limit::UNLIMITED);
        let system = mgr.system_scope();
        (mgr, system)
    }

    #[test]
    fn reservation_respects_system_cap() {
        let (mgr, system) = manager_with_limit(2);
        mgr.reserve_conn_inbound(system, Priority::Always).unwrap();
        let err = mgr
            .reserve(system, ResourceKind::ConnsInbound, 10, Priority::Always)
            .unwrap_err();
        assert!(matches!(err, ResourceError::LimitExceeded { .. }));
    }

    #[test]
    fn balanced_reserve_release_returns_to_zero() {
        let (mgr, system) = manager_with_limit(100);
        for _ in 0..5 {
            mgr.reserve_conn_inbound(system, Priority::Always).unwrap();
        }
        for _ in 0..5 {
            mgr.release_conn_inbound(system).unwrap();
        }
        let scope = mgr.scope(system).unwrap();
        assert_eq!(scope.usage(ResourceKind::ConnsInbound), 0);
        assert_eq!(scope.usage(ResourceKind::ConnsTotal), 0);
    }

    #[test]
    fn close_zeroes_parent_usage_and_is_idempotent() {
        let (mgr, system) = manager_with_limit(100);
        let child = mgr
            .create_child_scope(system, ScopeKind::Connection, "conn-1", Limit::UNLIMITED)
            .unwrap();
        mgr.reserve_conn_inbound(child, Priority::Always).unwrap();
        assert_eq!(mgr.scope(system).unwrap().usage(ResourceKind::ConnsTotal), 1);

        mgr.close(child).unwrap();
        assert_eq!(mgr.scope(system).unwrap().usage(ResourceKind::ConnsTotal), 0);

        // second close is a no-op, not an error or a double-release
        mgr.close(child).unwrap();
        assert_eq!(mgr.scope(system).unwrap().usage(ResourceKind::ConnsTotal), 0);
    }

    #[test]
    fn operations_on_closed_scope_are_rejected() {
        let (mgr, system) = manager_with_limit(100);
        let child = mgr
            .create_child_scope(system, ScopeKind::Connection, "conn-1", Limit::UNLIMITED)
            .unwrap();
        mgr.close(child).unwrap();
        let err = mgr.reserve_conn_inbound(child, Priority::Always).unwrap_err();
        assert!(matches!(err, ResourceError::ScopeClosed(_)));
    }

    #[test]
    fn reparent_moves_usage_between_chains() {
        let (mgr, system) = manager_with_limit(100);
        let transient = mgr.transient_scope();
        let conn = mgr
            .create_child_scope(transient, ScopeKind::Connection, "conn-1", Limit::UNLIMITED)
            .unwrap();
        mgr.reserve_conn_inbound(conn, Priority::Always).unwrap();
        assert_eq!(
            mgr.scope(transient).unwrap().usage(ResourceKind::ConnsTotal),
            1
        );

        let peer = mgr
            .create_child_scope(system, ScopeKind::Peer, "peer-1", Limit::UNLIMITED)
            .unwrap();
        mgr.reparent(conn, peer).unwrap();

        assert_eq!(
            mgr.scope(transient).unwrap().usage(ResourceKind::ConnsTotal),
            0
        );
        assert_eq!(mgr.scope(peer).unwrap().usage(ResourceKind::ConnsTotal), 1);
        assert_eq!(mgr.scope(system).unwrap().usage(ResourceKind::ConnsTotal), 1);
    }
}
