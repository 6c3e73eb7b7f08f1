//! Tunables for RealmAuth, Messaging, PubSub, and Liveness.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// RealmAuth handshake timeout (§4.5.1, default 10s).
    pub handshake_timeout: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self { handshake_timeout: Duration::from_secs(10) }
    }
}

#[derive(Debug, Clone)]
pub struct MessagingConfig {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub request_timeout: Duration,
    pub max_message_size: usize,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            request_timeout: Duration::from_secs(30),
            max_message_size: 4 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PubSubConfig {
    pub enable: bool,
    pub message_cache_size: usize,
    pub message_cache_ttl: Duration,
}

impl Default for PubSubConfig {
    fn default() -> Self {
        Self {
            enable: true,
            message_cache_size: 1000,
            message_cache_ttl: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HealthScoreConfig {
    pub decay_interval: Duration,
    pub decay_amount: u32,
    pub min_score: u32,
    pub recovery_on_ping: u32,
    pub recovery_on_data: u32,
}

impl Default for HealthScoreConfig {
    fn default() -> Self {
        Self {
            decay_interval: Duration::from_secs(60),
            decay_amount: 5,
            min_score: 0,
            recovery_on_ping: 2,
            recovery_on_data: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LivenessConfig {
    pub enable: bool,
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
    pub degraded_rtt_threshold: Duration,
    pub status_expiry: Duration,
    pub enable_goodbye: bool,
    pub goodbye_wait: Duration,
    pub health_score: HealthScoreConfig,
    /// Smoothing factor for `avgRTT <- avgRTT*(1-a) + rtt*a` (§4.5.6,
    /// §8 S5: three pings of 10/20/30ms settle at 10 -> 12 -> 15.6ms,
    /// which only holds for a=0.2, matching the path-health default).
    pub rtt_ewma_alpha: f64,
    pub max_failed_pings_before_offline: u32,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            enable: true,
            heartbeat_interval: Duration::from_secs(15),
            heartbeat_timeout: Duration::from_secs(45),
            degraded_rtt_threshold: Duration::from_millis(500),
            status_expiry: Duration::from_secs(300),
            enable_goodbye: true,
            goodbye_wait: Duration::from_secs(2),
            health_score: HealthScoreConfig::default(),
            rtt_ewma_alpha: 0.2,
            max_failed_pings_before_offline: 3,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RealmConfig {
    pub auth: AuthConfig,
    pub messaging: MessagingConfig,
    pub pubsub: PubSubConfig,
    pub liveness: LivenessConfig,
}
