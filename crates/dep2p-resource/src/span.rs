//! RAII sub-accounting regions.

use std::sync::Arc;

use crate::error::ResourceResult;
use crate::limit::Limit;
use crate::manager::ResourceManager;
use crate::scope::{ScopeId, ScopeKind};

/// A delimited sub-accounting region created by [`begin_span`].
///
/// Dropping a `ScopeSpan` — including on an unwinding panic or a
/// cancelled future — releases every resource the span's scope still
/// holds back to its parent. `done()` is the explicit, non-panicking
/// equivalent; calling it and then letting the guard drop is safe
/// because `ResourceManager::close` is idempotent.
pub struct ScopeSpan {
    manager: Arc<ResourceManager>,
    scope: ScopeId,
}

impl ScopeSpan {
    pub(crate) fn new(manager: Arc<ResourceManager>, scope: ScopeId) -> Self {
        Self { manager, scope }
    }

    pub fn scope_id(&self) -> ScopeId {
        self.scope
    }

    /// Close the span's scope now instead of waiting for drop.
    pub fn done(self) {
        let _ = self.manager.close(self.scope);
    }
}

impl Drop for ScopeSpan {
    fn drop(&mut self) {
        let _ = self.manager.close(self.scope);
    }
}

/// Convenience constructor so callers holding an `Arc<ResourceManager>`
/// don't need to import `ScopeKind`/`Limit` plumbing just to start a span.
pub fn begin_span(
    manager: Arc<ResourceManager>,
    parent: ScopeId,
    kind: ScopeKind,
    label: impl Into<String>,
    limit: Limit,
) -> ResourceResult<ScopeSpan> {
    let scope = manager.create_child_scope(parent, kind, label, limit)?;
    Ok(ScopeSpan::new(manager, scope))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::priority::Priority;

    #[test]
    fn drop_releases_resources_even_without_calling_done() {
        let manager = Arc::new(ResourceManager::new(Limit::UNLIMITED, Limit::UNLIMITED));
        let system = manager.system_scope();
        {
            let span = begin_span(
                manager.clone(),
                system,
                ScopeKind::Service,
                "probe",
                Limit::UNLIMITED,
            )
            .unwrap();
            manager
                .reserve_conn_inbound(span.scope_id(), Priority::Always)
                .unwrap();
        }
        // span dropped here; its scope should already be closed
        let span2 = begin_span(
            manager.clone(),
            system,
            ScopeKind::Service,
            "probe-2",
            Limit::UNLIMITED,
        )
        .unwrap();
        assert_eq!(
            manager
                .scope(system)
                .unwrap()
                .usage(crate::limit::ResourceKind::ConnsTotal),
            0
        );
        drop(span2);
    }
}
