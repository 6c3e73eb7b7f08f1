//! Peer context injection for multi-instance logging
//!
//! This module provides thread-local storage for peer identity context,
//! allowing automatic injection of peer_id into all log entries within a scope.

use std::cell::RefCell;

use dep2p_core::NodeId;
use uuid::Uuid;

/// Peer context data stored in thread-local storage
#[derive(Debug, Clone)]
pub struct PeerContextData {
    /// The peer's node id, Base58-encoded
    pub peer_id: String,
    /// Unique instance ID for this peer session
    pub instance_id: Uuid,
}

thread_local! {
    static PEER_CONTEXT: RefCell<Option<PeerContextData>> = const { RefCell::new(None) };
}

/// RAII guard for peer context
///
/// When this guard is created, it sets the peer context for the current thread.
/// When it's dropped, it restores the previous context (if any).
///
/// # Example
///
/// ```ignore
/// use dep2p_logging::context::PeerContextGuard;
/// use dep2p_core::NodeId;
///
/// let peer = NodeId::from_bytes([1u8; 32]);
/// let _guard = PeerContextGuard::new(&peer);
///
/// // All tracing events in this scope will include peer_id = "..."
/// tracing::info!("processing stream");
/// ```
pub struct PeerContextGuard {
    previous: Option<PeerContextData>,
}

impl PeerContextGuard {
    /// Create a new peer context guard
    ///
    /// This sets the peer identity for all log entries in the current scope.
    pub fn new(node_id: &NodeId) -> Self {
        let previous = PEER_CONTEXT.with(|ctx| ctx.borrow().clone());

        let new_ctx = PeerContextData {
            peer_id: node_id.to_base58(),
            instance_id: Uuid::new_v4(),
        };

        PEER_CONTEXT.with(|ctx| *ctx.borrow_mut() = Some(new_ctx));

        Self { previous }
    }

    /// Create a guard with a specific instance ID
    ///
    /// Useful when you want to maintain a consistent instance ID across restarts.
    pub fn with_instance_id(node_id: &NodeId, instance_id: Uuid) -> Self {
        let previous = PEER_CONTEXT.with(|ctx| ctx.borrow().clone());

        let new_ctx = PeerContextData {
            peer_id: node_id.to_base58(),
            instance_id,
        };

        PEER_CONTEXT.with(|ctx| *ctx.borrow_mut() = Some(new_ctx));

        Self { previous }
    }

    /// Get the current peer context (if any)
    pub fn current() -> Option<PeerContextData> {
        PEER_CONTEXT.with(|ctx| ctx.borrow().clone())
    }

    /// Get the current peer ID (if set)
    pub fn current_peer_id() -> Option<String> {
        Self::current().map(|ctx| ctx.peer_id)
    }

    /// Get the current instance ID (if set)
    pub fn current_instance_id() -> Option<Uuid> {
        Self::current().map(|ctx| ctx.instance_id)
    }
}

impl Drop for PeerContextGuard {
    fn drop(&mut self) {
        PEER_CONTEXT.with(|ctx| *ctx.borrow_mut() = self.previous.take());
    }
}

/// Convenience macro to create a peer context scope
///
/// # Example
///
/// ```ignore
/// with_peer_context!(&peer, {
///     tracing::info!("processing stream");
/// });
/// ```
#[macro_export]
macro_rules! with_peer_context {
    ($node_id:expr, $body:block) => {{
        let _guard = $crate::context::PeerContextGuard::new($node_id);
        $body
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_node(byte: u8) -> NodeId {
        NodeId::from_bytes([byte; 32])
    }

    #[test]
    fn test_peer_context_guard() {
        assert!(PeerContextGuard::current().is_none());

        let peer = test_node(0xA1);
        {
            let _guard = PeerContextGuard::new(&peer);
            let ctx = PeerContextGuard::current().unwrap();
            assert_eq!(ctx.peer_id, peer.to_base58());
        }

        assert!(PeerContextGuard::current().is_none());
    }

    #[test]
    fn test_nested_contexts() {
        let peer_a = test_node(0xAA);
        let peer_b = test_node(0xBB);

        {
            let _guard_a = PeerContextGuard::new(&peer_a);
            assert_eq!(PeerContextGuard::current_peer_id(), Some(peer_a.to_base58()));

            {
                let _guard_b = PeerContextGuard::new(&peer_b);
                assert_eq!(PeerContextGuard::current_peer_id(), Some(peer_b.to_base58()));
            }

            assert_eq!(PeerContextGuard::current_peer_id(), Some(peer_a.to_base58()));
        }

        assert!(PeerContextGuard::current_peer_id().is_none());
    }

    #[test]
    fn test_with_instance_id() {
        let peer = test_node(0xCC);
        let instance_id = Uuid::new_v4();

        {
            let _guard = PeerContextGuard::with_instance_id(&peer, instance_id);
            let ctx = PeerContextGuard::current().unwrap();
            assert_eq!(ctx.instance_id, instance_id);
        }
    }
}
