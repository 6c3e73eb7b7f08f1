//! Error types for scoped resource accounting.

use thiserror::Error;

use crate::scope::{ScopeId, ScopeKind};

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("reservation of {requested} would exceed the {kind:?} limit for scope {scope:?} (current {current}, limit {limit})")]
    LimitExceeded {
        scope: ScopeId,
        kind: ScopeKind,
        requested: i64,
        current: i64,
        limit: i64,
    },

    #[error("scope {0:?} is closed")]
    ScopeClosed(ScopeId),

    #[error("no such scope: {0:?}")]
    UnknownScope(ScopeId),
}

pub type ResourceResult<T> = Result<T, ResourceError>;
