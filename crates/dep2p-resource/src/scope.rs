//! Scope identity and the atomic counters each scope accumulates.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use parking_lot::RwLock;

use crate::limit::{Limit, ResourceKind};

/// Which rung of the System ⊃ {Transient, Service, Protocol, Peer} ⊃
/// Connection ⊃ Stream hierarchy a scope occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    System,
    Transient,
    Service,
    Protocol,
    Peer,
    Connection,
    Stream,
}

/// A stable, arena-indexed scope identifier. Child-to-parent links store
/// this id rather than a pointer, so the scope graph has no reference
/// cycles and no lifetime to thread through async code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub(crate) u64);

impl ScopeId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

pub(crate) struct Counters {
    pub streams_total: AtomicI64,
    pub streams_inbound: AtomicI64,
    pub streams_outbound: AtomicI64,
    pub conns_total: AtomicI64,
    pub conns_inbound: AtomicI64,
    pub conns_outbound: AtomicI64,
    pub file_descriptors: AtomicI64,
    pub memory_bytes: AtomicI64,
}

impl Counters {
    fn new() -> Self {
        Self {
            streams_total: AtomicI64::new(0),
            streams_inbound: AtomicI64::new(0),
            streams_outbound: AtomicI64::new(0),
            conns_total: AtomicI64::new(0),
            conns_inbound: AtomicI64::new(0),
            conns_outbound: AtomicI64::new(0),
            file_descriptors: AtomicI64::new(0),
            memory_bytes: AtomicI64::new(0),
        }
    }

    fn cell(&self, kind: ResourceKind) -> &AtomicI64 {
        match kind {
            ResourceKind::StreamsTotal => &self.streams_total,
            ResourceKind::StreamsInbound => &self.streams_inbound,
            ResourceKind::StreamsOutbound => &self.streams_outbound,
            ResourceKind::ConnsTotal => &self.conns_total,
            ResourceKind::ConnsInbound => &self.conns_inbound,
            ResourceKind::ConnsOutbound => &self.conns_outbound,
            ResourceKind::FileDescriptors => &self.file_descriptors,
            ResourceKind::Memory => &self.memory_bytes,
        }
    }

    pub fn get(&self, kind: ResourceKind) -> i64 {
        self.cell(kind).load(Ordering::SeqCst)
    }

    pub fn add(&self, kind: ResourceKind, delta: i64) -> i64 {
        self.cell(kind).fetch_add(delta, Ordering::SeqCst) + delta
    }
}

/// One node in the resource-accounting hierarchy.
pub struct Scope {
    pub id: ScopeId,
    pub kind: ScopeKind,
    pub label: String,
    pub(crate) parent: RwLock<Option<ScopeId>>,
    pub limit: Limit,
    pub(crate) counters: Counters,
    pub(crate) closed: AtomicBool,
}

impl Scope {
    pub(crate) fn new(
        id: ScopeId,
        kind: ScopeKind,
        label: String,
        parent: Option<ScopeId>,
        limit: Limit,
    ) -> Self {
        Self {
            id,
            kind,
            label,
            parent: RwLock::new(parent),
            limit,
            counters: Counters::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn usage(&self, kind: ResourceKind) -> i64 {
        self.counters.get(kind)
    }

    pub fn parent(&self) -> Option<ScopeId> {
        *self.parent.read()
    }
}
