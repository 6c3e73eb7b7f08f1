//! Per-(peer, address) path health tracking: EWMA RTT, state machine,
//! scoring, and address ranking (§4.4.2).

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, trace};

use dep2p_core::{Address, NodeId};

use crate::config::SwarmConfig;

/// Whether a path goes straight to the peer or through a relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathType {
    Direct,
    Relay,
}

/// `<type>:<address>` identity of a path, scoped to one peer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathId {
    pub peer: NodeId,
    pub path_type: PathType,
    pub address: Address,
}

impl PathId {
    pub fn new(peer: NodeId, address: Address) -> Self {
        let path_type = if address.is_relay_circuit() {
            PathType::Relay
        } else {
            PathType::Direct
        };
        Self { peer, path_type, address }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathState {
    Unknown,
    Healthy,
    Suspect,
    Dead,
}

/// Accumulated statistics for one path.
#[derive(Debug, Clone)]
pub struct PathStats {
    pub ewma_rtt: Option<Duration>,
    pub last_rtt: Option<Duration>,
    pub min_rtt: Option<Duration>,
    pub max_rtt: Option<Duration>,
    pub successes: u64,
    pub failures: u64,
    pub consecutive_failures: u32,
    pub first_seen: Instant,
    pub last_seen: Instant,
    pub last_state_change: Instant,
    pub state: PathState,
}

impl PathStats {
    fn new(now: Instant) -> Self {
        Self {
            ewma_rtt: None,
            last_rtt: None,
            min_rtt: None,
            max_rtt: None,
            successes: 0,
            failures: 0,
            consecutive_failures: 0,
            first_seen: now,
            last_seen: now,
            last_state_change: now,
            state: PathState::Unknown,
        }
    }

    fn record_success(&mut self, rtt: Duration, alpha: f64, now: Instant) {
        self.successes += 1;
        self.consecutive_failures = 0;
        self.last_seen = now;
        self.last_rtt = Some(rtt);
        self.min_rtt = Some(self.min_rtt.map_or(rtt, |m| m.min(rtt)));
        self.max_rtt = Some(self.max_rtt.map_or(rtt, |m| m.max(rtt)));
        self.ewma_rtt = Some(match self.ewma_rtt {
            None => rtt,
            Some(prev) => {
                let prev_ms = prev.as_secs_f64() * 1000.0;
                let rtt_ms = rtt.as_secs_f64() * 1000.0;
                let next_ms = prev_ms * (1.0 - alpha) + rtt_ms * alpha;
                Duration::from_secs_f64((next_ms / 1000.0).max(0.0))
            }
        });
    }

    fn record_failure(&mut self, now: Instant) {
        self.failures += 1;
        self.consecutive_failures += 1;
        self.last_seen = now;
    }

    fn success_rate(&self) -> f64 {
        let total = self.successes + self.failures;
        if total == 0 {
            1.0
        } else {
            self.successes as f64 / total as f64
        }
    }

    fn recompute_state(&mut self, cfg: &SwarmConfig, now: Instant) {
        let next = if self.consecutive_failures >= cfg.dead_failure_threshold {
            PathState::Dead
        } else if self.ewma_rtt.is_none() {
            PathState::Unknown
        } else {
            let ewma = self.ewma_rtt.unwrap();
            if ewma > cfg.suspect_rtt_threshold
                || ewma > cfg.healthy_rtt_threshold
                || self.consecutive_failures > 0
            {
                PathState::Suspect
            } else {
                PathState::Healthy
            }
        };
        if next != self.state {
            self.state = next;
            self.last_state_change = now;
        }
    }

    /// Lower is better. Dead paths score 1e9, Unknown paths 1e6.
    pub fn score(&self, path_type: PathType, cfg: &SwarmConfig) -> f64 {
        match self.state {
            PathState::Dead => 1e9,
            PathState::Unknown => 1e6,
            PathState::Healthy | PathState::Suspect => {
                let ewma_ms = self.ewma_rtt.unwrap_or_default().as_secs_f64() * 1000.0;
                let mut score = ewma_ms + (1.0 - self.success_rate()) * 1000.0;
                if self.state == PathState::Suspect {
                    score *= 1.5;
                }
                if path_type == PathType::Direct {
                    score *= cfg.direct_path_bonus;
                }
                score
            }
        }
    }
}

/// Tracks every path this node has observed or attempted, across all peers.
pub struct PathHealthManager {
    cfg: SwarmConfig,
    paths: DashMap<PathId, PathStats>,
}

impl PathHealthManager {
    pub fn new(cfg: SwarmConfig) -> Self {
        Self { cfg, paths: DashMap::new() }
    }

    pub fn record_success(&self, peer: NodeId, address: &Address, rtt: Duration) {
        let id = PathId::new(peer, address.clone());
        let now = Instant::now();
        let mut entry = self.paths.entry(id).or_insert_with(|| PathStats::new(now));
        entry.record_success(rtt, self.cfg.ewma_alpha, now);
        entry.recompute_state(&self.cfg, now);
        trace!(peer = %peer, addr = %address.render(), state = ?entry.state, "path success recorded");
    }

    pub fn record_failure(&self, peer: NodeId, address: &Address) {
        let id = PathId::new(peer, address.clone());
        let now = Instant::now();
        let mut entry = self.paths.entry(id).or_insert_with(|| PathStats::new(now));
        entry.record_failure(now);
        entry.recompute_state(&self.cfg, now);
        if entry.state == PathState::Dead {
            debug!(peer = %peer, addr = %address.render(), "path declared dead");
        }
    }

    pub fn state(&self, peer: NodeId, address: &Address) -> PathState {
        let id = PathId::new(peer, address.clone());
        self.paths.get(&id).map(|p| p.state).unwrap_or(PathState::Unknown)
    }

    fn score_of(&self, peer: NodeId, address: &Address) -> f64 {
        let id = PathId::new(peer, address.clone());
        match self.paths.get(&id) {
            Some(p) => p.score(id.path_type, &self.cfg),
            None => 1e6,
        }
    }

    /// Sorts candidate addresses ascending by score, dropping Dead paths.
    pub fn rank_addrs(&self, peer: NodeId, addrs: &[Address]) -> Vec<Address> {
        let mut scored: Vec<(f64, Address)> = addrs
            .iter()
            .filter(|addr| self.state(peer, addr) != PathState::Dead)
            .map(|addr| (self.score_of(peer, addr), addr.clone()))
            .collect();
        scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().map(|(_, addr)| addr).collect()
    }

    /// Whether to switch from `current` to `best`, per §4.4.2's hysteresis rule.
    pub fn should_switch(&self, peer: NodeId, current: &Address, best: &Address) -> bool {
        if current == best {
            return false;
        }
        let current_id = PathId::new(peer, current.clone());
        let (current_state, current_age) = match self.paths.get(&current_id) {
            Some(p) => (p.state, p.last_state_change.elapsed()),
            None => (PathState::Unknown, Duration::ZERO),
        };
        if current_state == PathState::Dead {
            return true;
        }
        let current_score = self.score_of(peer, current);
        let best_score = self.score_of(peer, best);
        if current_score <= 0.0 {
            return best_score < current_score;
        }
        let improvement = (current_score - best_score) / current_score;
        let stable_enough = self.cfg.stability_window.is_zero() || current_age >= self.cfg.stability_window;
        improvement > self.cfg.switch_hysteresis && stable_enough
    }

    /// Clears consecutive-failure counters after a link transition, forcing
    /// a fresh health assessment without discarding history.
    pub fn on_network_change(&self) {
        let now = Instant::now();
        for mut entry in self.paths.iter_mut() {
            entry.consecutive_failures = 0;
            entry.recompute_state(&self.cfg, now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    use dep2p_core::AddressComponent;

    fn peer() -> NodeId {
        NodeId::from_bytes([7u8; 32])
    }

    fn addr(port: u16) -> Address {
        Address::new(vec![
            AddressComponent::Ip4(Ipv4Addr::LOCALHOST),
            AddressComponent::Udp(port),
            AddressComponent::QuicV1,
        ])
    }

    #[test]
    fn ewma_matches_three_ping_scenario() {
        let mgr = PathHealthManager::new(SwarmConfig::default());
        let p = peer();
        let a = addr(1);
        mgr.record_success(p, &a, Duration::from_millis(10));
        mgr.record_success(p, &a, Duration::from_millis(20));
        mgr.record_success(p, &a, Duration::from_millis(30));
        let ewma = mgr.paths.get(&PathId::new(p, a)).unwrap().ewma_rtt.unwrap();
        assert!((ewma.as_secs_f64() * 1000.0 - 15.6).abs() < 0.01);
    }

    #[test]
    fn three_consecutive_failures_declares_dead() {
        let mgr = PathHealthManager::new(SwarmConfig::default());
        let p = peer();
        let a = addr(2);
        mgr.record_failure(p, &a);
        mgr.record_failure(p, &a);
        assert_ne!(mgr.state(p, &a), PathState::Dead);
        mgr.record_failure(p, &a);
        assert_eq!(mgr.state(p, &a), PathState::Dead);
    }

    #[test]
    fn success_revives_a_non_dead_path() {
        let mgr = PathHealthManager::new(SwarmConfig::default());
        let p = peer();
        let a = addr(3);
        mgr.record_failure(p, &a);
        mgr.record_success(p, &a, Duration::from_millis(50));
        assert_ne!(mgr.state(p, &a), PathState::Dead);
    }

    #[test]
    fn rank_addrs_matches_scenario_s6() {
        let mgr = PathHealthManager::new(SwarmConfig::default());
        let p = peer();
        let (a, b, c) = (addr(10), addr(20), addr(30));

        for _ in 0..5 {
            mgr.record_success(p, &a, Duration::from_millis(100));
            mgr.record_success(p, &b, Duration::from_millis(50));
        }
        // Push C into Suspect via an EWMA RTT above the healthy threshold.
        for _ in 0..5 {
            mgr.record_success(p, &c, Duration::from_millis(201));
        }
        assert_eq!(mgr.state(p, &c), PathState::Suspect);

        let ranked = mgr.rank_addrs(p, &[a.clone(), b.clone(), c.clone()]);
        assert_eq!(ranked, vec![b, a, c]);
    }

    #[test]
    fn dead_path_is_dropped_from_ranking() {
        let mgr = PathHealthManager::new(SwarmConfig::default());
        let p = peer();
        let (a, b) = (addr(40), addr(50));
        mgr.record_success(p, &a, Duration::from_millis(10));
        mgr.record_failure(p, &b);
        mgr.record_failure(p, &b);
        mgr.record_failure(p, &b);
        assert_eq!(mgr.rank_addrs(p, &[a.clone(), b]), vec![a]);
    }
}
