//! Stress tests for the hierarchical resource manager.
//!
//! These tests exercise the manager under concurrent, high-volume
//! reserve/release traffic to catch lock-ordering or counter-drift bugs
//! that only show up under contention.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use dep2p_resource::{Limit, Priority, ResourceKind, ResourceManager, ScopeKind};

#[test]
fn concurrent_reserve_release_balances_to_zero() {
    let manager = Arc::new(ResourceManager::new(Limit::UNLIMITED, Limit::UNLIMITED));
    let system = manager.system_scope();
    let peer = manager
        .create_child_scope(system, ScopeKind::Peer, "peer-stress", Limit::UNLIMITED)
        .unwrap();

    const THREAD_COUNT: usize = 8;
    const OPS_PER_THREAD: usize = 2_000;

    let start = Instant::now();
    let mut handles = Vec::new();

    for _ in 0..THREAD_COUNT {
        let manager = manager.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..OPS_PER_THREAD {
                manager.reserve_stream_inbound(peer, Priority::Always).unwrap();
                manager.release_stream_inbound(peer).unwrap();
            }
        }));
    }

    for h in handles {
        h.join().expect("stress thread should complete");
    }

    let duration = start.elapsed();
    println!(
        "completed {} balanced reserve/release pairs in {:?}",
        THREAD_COUNT * OPS_PER_THREAD,
        duration
    );

    let scope = manager.scope(peer).unwrap();
    assert_eq!(scope.usage(ResourceKind::StreamsInbound), 0);
    assert_eq!(scope.usage(ResourceKind::StreamsTotal), 0);
    assert_eq!(
        manager.scope(system).unwrap().usage(ResourceKind::StreamsTotal),
        0
    );
    assert!(duration < Duration::from_secs(10), "contended reserve/release should stay fast");
}

#[test]
fn concurrent_reservations_never_exceed_the_cap() {
    let mut limit = Limit::UNLIMITED;
    limit.conns_total = 50;
    limit.conns_inbound = 50;
    let manager = Arc::new(ResourceManager::new(limit, Limit::UNLIMITED));
    let system = manager.system_scope();

    const THREAD_COUNT: usize = 16;
    const ATTEMPTS_PER_THREAD: usize = 20;

    let mut handles = Vec::new();
    for _ in 0..THREAD_COUNT {
        let manager = manager.clone();
        handles.push(thread::spawn(move || {
            let mut granted = 0;
            for _ in 0..ATTEMPTS_PER_THREAD {
                if manager.reserve_conn_inbound(system, Priority::Always).is_ok() {
                    granted += 1;
                }
            }
            granted
        }));
    }

    let total_granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(total_granted, 50, "exactly the configured cap should be granted");
    assert_eq!(
        manager.scope(system).unwrap().usage(ResourceKind::ConnsInbound),
        50
    );
}

#[test]
fn many_short_lived_scopes_release_cleanly_on_close() {
    let manager = Arc::new(ResourceManager::new(Limit::UNLIMITED, Limit::UNLIMITED));
    let system = manager.system_scope();

    const SCOPE_COUNT: usize = 1_000;
    let start = Instant::now();

    for i in 0..SCOPE_COUNT {
        let conn = manager
            .create_child_scope(
                system,
                ScopeKind::Connection,
                format!("conn-{i}"),
                Limit::UNLIMITED,
            )
            .unwrap();
        manager.reserve_conn_inbound(conn, Priority::Always).unwrap();
        for _ in 0..3 {
            manager.reserve_stream_inbound(conn, Priority::Always).unwrap();
        }
        manager.close(conn).unwrap();
    }

    println!(
        "opened, used, and closed {} scopes in {:?}",
        SCOPE_COUNT,
        start.elapsed()
    );

    let scope = manager.scope(system).unwrap();
    assert_eq!(scope.usage(ResourceKind::ConnsTotal), 0);
    assert_eq!(scope.usage(ResourceKind::StreamsTotal), 0);
}
