//! # dep2p-resource
//!
//! Hierarchical resource accounting: `System ⊃ {Transient, Service,
//! Protocol, Peer} ⊃ Connection ⊃ Stream`. Every scope carries a
//! [`Limit`] across streams, connections, file descriptors, and memory;
//! usage accumulates upward through the ancestor chain, and a
//! reservation's [`Priority`] selects how far into that headroom it is
//! allowed to push before [`ResourceError::LimitExceeded`] is returned.
//!
//! The hierarchy is a flat arena of [`Scope`]s keyed by stable
//! [`ScopeId`]s rather than a pointer graph, so it has no reference
//! cycles and nothing here needs a lifetime parameter.

pub mod error;
pub mod limit;
pub mod manager;
pub mod priority;
pub mod scope;
pub mod span;

pub use error::{ResourceError, ResourceResult};
pub use limit::{Limit, ResourceKind};
pub use manager::ResourceManager;
pub use priority::Priority;
pub use scope::{Scope, ScopeId, ScopeKind};
pub use span::{begin_span, ScopeSpan};
