//! Tunables for the dial scheduler and path-health manager.

use std::time::Duration;

/// Knobs governing dialing, path health, and bandwidth accounting.
#[derive(Debug, Clone)]
pub struct SwarmConfig {
    /// Delay before re-queuing a static peer after its connection drops.
    pub static_reconnect_delay: Duration,
    /// Max dials in flight at once.
    pub max_active_dials: usize,
    /// Max total dialed connections.
    pub max_dialed_conns: usize,
    /// How long a dial-history entry suppresses a repeat dynamic dial.
    pub dial_history_expiration: Duration,
    /// Per-dial timeout.
    pub dial_timeout: Duration,
    /// Consecutive failures after which a path is declared Dead.
    pub dead_failure_threshold: u32,
    /// EWMA RTT above which a path is Suspect.
    pub suspect_rtt_threshold: Duration,
    /// EWMA RTT above which a path is no longer Healthy.
    pub healthy_rtt_threshold: Duration,
    /// EWMA smoothing factor, 0 < alpha <= 1.
    pub ewma_alpha: f64,
    /// Multiplicative score bonus (< 1.0) applied to direct paths.
    pub direct_path_bonus: f64,
    /// Minimum relative score improvement required to switch paths.
    pub switch_hysteresis: f64,
    /// Minimum time a path must hold its current state before a switch is allowed.
    pub stability_window: Duration,
    /// Bandwidth rollup interval.
    pub bandwidth_rollup_interval: Duration,
    /// Peers idle longer than this are trimmed from the bandwidth map.
    pub bandwidth_idle_timeout: Duration,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            static_reconnect_delay: Duration::from_secs(5),
            max_active_dials: 16,
            max_dialed_conns: 50,
            dial_history_expiration: Duration::from_secs(30),
            dial_timeout: Duration::from_secs(10),
            dead_failure_threshold: 3,
            suspect_rtt_threshold: Duration::from_millis(500),
            healthy_rtt_threshold: Duration::from_millis(200),
            ewma_alpha: 0.2,
            direct_path_bonus: 0.8,
            switch_hysteresis: 0.2,
            stability_window: Duration::from_secs(5),
            bandwidth_rollup_interval: Duration::from_secs(10),
            bandwidth_idle_timeout: Duration::from_secs(600),
        }
    }
}

impl SwarmConfig {
    /// Free dial slots given the current connected count and in-flight count,
    /// per §4.4.1's formula.
    pub fn free_dial_slots(&self, connected_count: usize, in_flight: usize) -> usize {
        let headroom = self
            .max_dialed_conns
            .saturating_sub(connected_count)
            .saturating_mul(2);
        headroom.min(self.max_active_dials).saturating_sub(in_flight)
    }
}
