//! Reservation priorities and the utilization threshold they enforce.

/// Selects which fraction of a scope's limit a reservation is allowed to
/// push usage up to. `Always` bypasses the fraction entirely and compares
/// straight against the limit, for work that must not be starved (e.g.
/// releasing resources, or system-protocol traffic).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    /// May push utilization up to 40% of the limit.
    Low,
    /// May push utilization up to 60% of the limit.
    Medium,
    /// May push utilization up to 80% of the limit.
    High,
    /// Compares directly against the limit, ignoring thresholds.
    Always,
    /// A raw 0-255 priority value; threshold is `(value + 1) / 256` of
    /// the limit.
    Custom(u8),
}

impl Priority {
    fn raw(self) -> u8 {
        match self {
            Priority::Low => 101,  // floor(256 * 0.40) - 1
            Priority::Medium => 152, // floor(256 * 0.60) - 1
            Priority::High => 203,  // floor(256 * 0.80) - 1
            Priority::Always => 255,
            Priority::Custom(v) => v,
        }
    }

    /// Whether `current + requested` is allowed under `limit` at this
    /// priority.
    pub fn allows(self, current: i64, requested: i64, limit: i64) -> bool {
        if matches!(self, Priority::Always) {
            return current.saturating_add(requested) <= limit;
        }
        let raw = self.raw() as i64;
        // threshold = limit * (raw + 1) / 256, computed in wider
        // arithmetic to avoid overflow on i64::MAX limits.
        let threshold = ((limit as i128) * (raw + 1) as i128 / 256) as i64;
        current.saturating_add(requested) <= threshold
    }
}
