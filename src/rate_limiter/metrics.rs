//! # Limiter Metrics and Health
//!
//! Snapshots for monitoring admission control. Nothing here is live: each
//! struct is a copy taken at one instant, safe to log or ship elsewhere.
//!
//! ```text
//!     TokenBucket::metrics()  ──► LimiterMetrics ──► health_status()
//!                                                     Healthy │ Degraded │ Critical
//!
//!     SlidingWindow::stats()  ─┐
//!                              ├─► KeyedStats ──► is_near_capacity()
//!     KeyedTokenBucket::stats()┘
//! ```

use std::fmt;

/// Rejection streak beyond which a limiter counts as under sustained pressure.
const SUSTAINED_REJECTION_STREAK: u64 = 10;

/// Rejection ratio beyond which a limiter counts as under sustained pressure.
const SUSTAINED_PRESSURE_RATIO: f64 = 0.3;

/// Snapshot of one token bucket's counters and fill level.
///
/// ## Example
///
/// ```rust
/// use corral::{HealthStatus, TokenBucket};
///
/// let bucket = TokenBucket::new(10, 1.0).unwrap();
/// bucket.allow();
///
/// let metrics = bucket.metrics();
/// assert_eq!(metrics.total_admitted, 1);
/// assert_eq!(metrics.health_status(), HealthStatus::Healthy);
/// println!("{}", metrics.summary());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct LimiterMetrics {
    /// Tokens consumed by admitted requests.
    pub total_admitted: u64,

    /// Requests turned away.
    pub total_rejected: u64,

    /// Refills that added at least one micro-token.
    pub total_refills: u64,

    /// Tokens in the bucket when the snapshot was taken.
    pub current_tokens: f64,

    /// Configured capacity.
    pub capacity: u64,

    /// Configured refill rate in tokens per second.
    pub refill_rate: f64,

    /// Rejections since the last admission.
    pub consecutive_rejections: u64,
}

impl LimiterMetrics {
    /// Fraction of requests admitted; `1.0` before the first request.
    #[inline]
    pub fn success_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            1.0
        } else {
            self.total_admitted as f64 / total as f64
        }
    }

    /// Fraction of requests rejected.
    #[inline]
    pub fn rejection_rate(&self) -> f64 {
        1.0 - self.success_rate()
    }

    /// Admitted plus rejected.
    #[inline]
    pub fn total_requests(&self) -> u64 {
        self.total_admitted + self.total_rejected
    }

    /// How much of the burst allowance is spent: `0.0` full, `1.0` empty.
    #[inline]
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            1.0 - (self.current_tokens / self.capacity as f64)
        }
    }

    /// Remaining burst allowance as a percentage.
    #[inline]
    pub fn availability_percentage(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            (self.current_tokens / self.capacity as f64) * 100.0
        }
    }

    /// Less than half the requests got through, or not a whole token is left.
    #[inline]
    pub fn is_under_pressure(&self) -> bool {
        self.success_rate() < 0.5 || self.current_tokens < 1.0
    }

    /// A long rejection streak, or more than 30% of all requests rejected.
    #[inline]
    pub fn is_under_sustained_pressure(&self) -> bool {
        self.consecutive_rejections > SUSTAINED_REJECTION_STREAK
            || self.rejection_rate() > SUSTAINED_PRESSURE_RATIO
    }

    /// Three-level assessment derived from the pressure checks.
    pub fn health_status(&self) -> HealthStatus {
        if self.is_under_sustained_pressure() {
            HealthStatus::Critical
        } else if self.is_under_pressure() {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    /// Multi-line report for logs.
    ///
    /// ```text
    /// TokenBucket Metrics:
    /// ├─ Performance:
    /// │  ├─ Success Rate: 85.50%
    /// │  └─ Rejection Rate: 14.50%
    /// ├─ Capacity:
    /// │  ├─ Available Tokens: 75.00/100
    /// ...
    /// ```
    pub fn summary(&self) -> String {
        format!(
            "TokenBucket Metrics:\n\
             ├─ Performance:\n\
             │  ├─ Success Rate: {:.2}%\n\
             │  └─ Rejection Rate: {:.2}%\n\
             ├─ Capacity:\n\
             │  ├─ Available Tokens: {:.2}/{}\n\
             │  ├─ Refill Rate: {:.2}/s\n\
             │  ├─ Utilization: {:.2}%\n\
             │  └─ Availability: {:.2}%\n\
             ├─ Counters:\n\
             │  ├─ Total Admitted: {}\n\
             │  ├─ Total Rejected: {}\n\
             │  ├─ Total Refills: {}\n\
             │  └─ Consecutive Rejections: {}\n\
             └─ Health:\n\
                ├─ Status: {:?}\n\
                ├─ Under Pressure: {}\n\
                └─ Under Sustained Pressure: {}",
            self.success_rate() * 100.0,
            self.rejection_rate() * 100.0,
            self.current_tokens,
            self.capacity,
            self.refill_rate,
            self.utilization() * 100.0,
            self.availability_percentage(),
            self.total_admitted,
            self.total_rejected,
            self.total_refills,
            self.consecutive_rejections,
            self.health_status(),
            self.is_under_pressure(),
            self.is_under_sustained_pressure()
        )
    }
}

impl fmt::Display for LimiterMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}

/// Health of a limiter.
///
/// ```text
///     Healthy ──────► Normal operation, plenty of capacity
///        │
///     Degraded ─────► Some pressure, monitor closely
///        │
///     Critical ─────► Severe pressure, immediate action needed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Most requests admitted and tokens to spare.
    Healthy,

    /// Bucket drained or fewer than half the requests admitted.
    Degraded,

    /// Sustained rejections; demand consistently exceeds the configured rate.
    Critical,
}

impl HealthStatus {
    /// `true` for anything other than [`Healthy`](Self::Healthy).
    pub fn is_unhealthy(&self) -> bool {
        !matches!(self, Self::Healthy)
    }

    /// Operator guidance for the status.
    pub fn suggested_action(&self) -> &'static str {
        match self {
            Self::Healthy => "No action needed",
            Self::Degraded => "Monitor closely, consider increasing capacity",
            Self::Critical => "Immediate action required: scale up or reduce load",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "Healthy"),
            Self::Degraded => write!(f, "Degraded"),
            Self::Critical => write!(f, "Critical"),
        }
    }
}

/// Snapshot of a keyed limiter's identity table and decisions.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedStats {
    /// Identities currently holding state.
    pub tracked: usize,

    /// Configured identity cap.
    pub max_identities: usize,

    /// Identities ever created.
    pub total_created: u64,

    /// Identities reclaimed by sweeps or removed by `forget`/`clear`.
    pub total_reclaimed: u64,

    /// Requests from new identities turned away because the table was full.
    pub identities_rejected: u64,

    /// Requests admitted across all identities.
    pub total_admitted: u64,

    /// Requests rejected across all identities, including the above.
    pub total_rejected: u64,
}

impl KeyedStats {
    /// Fraction of the identity cap in use.
    pub fn capacity_used(&self) -> f64 {
        if self.max_identities == 0 {
            0.0
        } else {
            self.tracked as f64 / self.max_identities as f64
        }
    }

    /// More than 80% of the identity cap in use.
    pub fn is_near_capacity(&self) -> bool {
        self.capacity_used() > 0.8
    }

    /// Reclaimed identities per created identity.
    pub fn reclaim_ratio(&self) -> f64 {
        if self.total_created == 0 {
            0.0
        } else {
            self.total_reclaimed as f64 / self.total_created as f64
        }
    }

    /// Fraction of requests admitted; `1.0` before the first request.
    pub fn success_rate(&self) -> f64 {
        let total = self.total_admitted + self.total_rejected;
        if total == 0 {
            1.0
        } else {
            self.total_admitted as f64 / total as f64
        }
    }

    /// Multi-line report for logs.
    pub fn summary(&self) -> String {
        format!(
            "Keyed Limiter Stats:\n\
             ├─ Capacity:\n\
             │  ├─ Tracked Identities: {}/{}\n\
             │  ├─ Capacity Used: {:.2}%\n\
             │  └─ Available Slots: {}\n\
             ├─ Decisions:\n\
             │  ├─ Admitted: {}\n\
             │  ├─ Rejected: {}\n\
             │  └─ Success Rate: {:.2}%\n\
             └─ Lifetime:\n\
                ├─ Total Created: {}\n\
                ├─ Total Reclaimed: {}\n\
                └─ Rejected At Capacity: {}",
            self.tracked,
            self.max_identities,
            self.capacity_used() * 100.0,
            self.max_identities.saturating_sub(self.tracked),
            self.total_admitted,
            self.total_rejected,
            self.success_rate() * 100.0,
            self.total_created,
            self.total_reclaimed,
            self.identities_rejected
        )
    }
}

impl fmt::Display for KeyedStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(admitted: u64, rejected: u64, tokens: f64, streak: u64) -> LimiterMetrics {
        LimiterMetrics {
            total_admitted: admitted,
            total_rejected: rejected,
            total_refills: 0,
            current_tokens: tokens,
            capacity: 100,
            refill_rate: 10.0,
            consecutive_rejections: streak,
        }
    }

    #[test]
    fn calculations() {
        let m = metrics(80, 20, 25.0, 5);
        assert_eq!(m.success_rate(), 0.8);
        assert_eq!(m.utilization(), 0.75);
        assert_eq!(m.availability_percentage(), 25.0);
        assert_eq!(m.total_requests(), 100);
        assert!(!m.is_under_pressure());
        assert_eq!(m.health_status(), HealthStatus::Healthy);
    }

    #[test]
    fn health_levels() {
        assert_eq!(metrics(90, 5, 0.5, 1).health_status(), HealthStatus::Degraded);
        assert_eq!(metrics(40, 60, 0.0, 15).health_status(), HealthStatus::Critical);
        assert_eq!(metrics(100, 0, 0.0, 11).health_status(), HealthStatus::Critical);
    }

    #[test]
    fn empty_metrics() {
        let m = metrics(0, 0, 100.0, 0);
        assert_eq!(m.success_rate(), 1.0);
        assert_eq!(m.utilization(), 0.0);

        let zero = LimiterMetrics {
            capacity: 0,
            ..m
        };
        assert_eq!(zero.utilization(), 0.0);
        assert_eq!(zero.availability_percentage(), 0.0);
    }

    #[test]
    fn health_status_helpers() {
        assert!(!HealthStatus::Healthy.is_unhealthy());
        assert!(HealthStatus::Degraded.is_unhealthy());
        assert!(HealthStatus::Critical.suggested_action().contains("Immediate"));
        assert_eq!(HealthStatus::Degraded.to_string(), "Degraded");
    }

    #[test]
    fn summary_sections() {
        let summary = metrics(100, 20, 30.0, 0).to_string();
        assert!(summary.contains("TokenBucket Metrics"));
        assert!(summary.contains("Available Tokens: 30.00/100"));
        assert!(summary.contains("Health"));
    }

    #[test]
    fn keyed_stats() {
        let stats = KeyedStats {
            tracked: 850,
            max_identities: 1_000,
            total_created: 1_200,
            total_reclaimed: 350,
            identities_rejected: 2,
            total_admitted: 30,
            total_rejected: 10,
        };

        assert!(stats.is_near_capacity());
        assert_eq!(stats.capacity_used(), 0.85);
        assert_eq!(stats.success_rate(), 0.75);
        assert!((stats.reclaim_ratio() - 350.0 / 1_200.0).abs() < f64::EPSILON);
        assert!(stats.summary().contains("Tracked Identities: 850/1000"));
    }
}
