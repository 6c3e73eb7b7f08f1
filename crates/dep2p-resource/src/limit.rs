//! Per-scope resource limits and the resource dimension they bound.

/// Which counter a reservation or release call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    StreamsTotal,
    StreamsInbound,
    StreamsOutbound,
    ConnsTotal,
    ConnsInbound,
    ConnsOutbound,
    FileDescriptors,
    Memory,
}

/// The limit set carried by every scope. Fields are `i64` so "no limit"
/// can be expressed as `i64::MAX` without a separate `Option` layer.
#[derive(Debug, Clone, Copy)]
pub struct Limit {
    pub streams_total: i64,
    pub streams_inbound: i64,
    pub streams_outbound: i64,
    pub conns_total: i64,
    pub conns_inbound: i64,
    pub conns_outbound: i64,
    pub file_descriptors: i64,
    pub memory_bytes: i64,
}

impl Limit {
    /// A limit with every dimension unbounded.
    pub const UNLIMITED: Limit = Limit {
        streams_total: i64::MAX,
        streams_inbound: i64::MAX,
        streams_outbound: i64::MAX,
        conns_total: i64::MAX,
        conns_inbound: i64::MAX,
        conns_outbound: i64::MAX,
        file_descriptors: i64::MAX,
        memory_bytes: i64::MAX,
    };

    pub fn get(&self, kind: ResourceKind) -> i64 {
        match kind {
            ResourceKind::StreamsTotal => self.streams_total,
            ResourceKind::StreamsInbound => self.streams_inbound,
            ResourceKind::StreamsOutbound => self.streams_outbound,
            ResourceKind::ConnsTotal => self.conns_total,
            ResourceKind::ConnsInbound => self.conns_inbound,
            ResourceKind::ConnsOutbound => self.conns_outbound,
            ResourceKind::FileDescriptors => self.file_descriptors,
            ResourceKind::Memory => self.memory_bytes,
        }
    }
}
