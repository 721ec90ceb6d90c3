//! Snapshot flush scheduling.
//!
//! The board pushes its object list to the host in batches: a snapshot is
//! sent once enough time has passed or enough local edits have piled up,
//! whichever comes first. The check itself only runs at a fixed cadence.

#[cfg(not(target_arch = "wasm32"))]
use std::time::{Duration, Instant};

#[cfg(target_arch = "wasm32")]
use web_time::{Duration, Instant};

/// Flush after this long without a flush.
pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 60;

/// Flush after this many local mutations.
pub const DEFAULT_FLUSH_MUTATIONS: u32 = 20;

/// How often the flush condition is evaluated.
pub const DEFAULT_FLUSH_CHECK_SECS: u64 = 5;

/// Thresholds for sending snapshots to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushPolicy {
    pub max_interval: Duration,
    pub max_mutations: u32,
    pub check_interval: Duration,
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self {
            max_interval: Duration::from_secs(DEFAULT_FLUSH_INTERVAL_SECS),
            max_mutations: DEFAULT_FLUSH_MUTATIONS,
            check_interval: Duration::from_secs(DEFAULT_FLUSH_CHECK_SECS),
        }
    }
}

impl FlushPolicy {
    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    pub fn with_max_mutations(mut self, count: u32) -> Self {
        self.max_mutations = count;
        self
    }

    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }
}

/// Tracks time and mutations since the last flush.
#[derive(Debug, Clone)]
pub struct FlushScheduler {
    policy: FlushPolicy,
    last_flush: Instant,
    last_check: Instant,
    mutations: u32,
}

impl FlushScheduler {
    /// Start counting from `now`.
    pub fn new(policy: FlushPolicy, now: Instant) -> Self {
        Self {
            policy,
            last_flush: now,
            last_check: now,
            mutations: 0,
        }
    }

    pub fn policy(&self) -> &FlushPolicy {
        &self.policy
    }

    /// Count one local mutation.
    pub fn record_mutation(&mut self) {
        self.mutations = self.mutations.saturating_add(1);
    }

    pub fn pending_mutations(&self) -> u32 {
        self.mutations
    }

    /// Whether either threshold has been reached, ignoring check cadence.
    pub fn is_due(&self, now: Instant) -> bool {
        self.mutations >= self.policy.max_mutations
            || now.saturating_duration_since(self.last_flush) >= self.policy.max_interval
    }

    /// Periodic check, driven by a timer running at `check_interval`.
    /// Returns whether a flush should happen now.
    ///
    /// Ticks closer together than half the interval are coalesced; anything
    /// later counts as the next check, so a late timer callback followed by
    /// an on-time one still evaluates both.
    pub fn tick(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last_check) < self.policy.check_interval / 2 {
            return false;
        }
        self.last_check = now;
        self.is_due(now)
    }

    /// Reset both counters after a flush.
    pub fn mark_flushed(&mut self, now: Instant) {
        self.last_flush = now;
        self.mutations = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_flush_after_interval() {
        let start = Instant::now();
        let mut scheduler = FlushScheduler::new(FlushPolicy::default(), start);

        for t in (5..60).step_by(5) {
            assert!(!scheduler.tick(start + secs(t)), "fired early at {t}s");
        }
        assert!(scheduler.tick(start + secs(60)));
    }

    #[test]
    fn test_flush_after_mutations() {
        let start = Instant::now();
        let mut scheduler = FlushScheduler::new(FlushPolicy::default(), start);

        for _ in 0..19 {
            scheduler.record_mutation();
        }
        assert!(!scheduler.tick(start + secs(5)));
        scheduler.record_mutation();
        assert!(scheduler.tick(start + secs(10)));
    }

    #[test]
    fn test_never_fires_between_checks() {
        let start = Instant::now();
        let mut scheduler = FlushScheduler::new(FlushPolicy::default(), start);
        for _ in 0..25 {
            scheduler.record_mutation();
        }
        assert!(scheduler.is_due(start + secs(1)));
        assert!(!scheduler.tick(start + secs(1)));
        assert!(!scheduler.tick(start + Duration::from_millis(2_499)));
        assert!(scheduler.tick(start + secs(5)));
    }

    #[test]
    fn test_jittered_timer_still_checks() {
        let start = Instant::now();
        let mut scheduler = FlushScheduler::new(FlushPolicy::default(), start);

        assert!(!scheduler.tick(start + Duration::from_millis(5_010)));
        for _ in 0..20 {
            scheduler.record_mutation();
        }
        assert!(scheduler.tick(start + Duration::from_millis(10_002)));
    }

    #[test]
    fn test_mark_flushed_resets_counters() {
        let start = Instant::now();
        let mut scheduler = FlushScheduler::new(FlushPolicy::default(), start);
        for _ in 0..20 {
            scheduler.record_mutation();
        }
        assert!(scheduler.tick(start + secs(5)));
        scheduler.mark_flushed(start + secs(5));

        assert_eq!(scheduler.pending_mutations(), 0);
        assert!(!scheduler.tick(start + secs(10)));
        assert!(!scheduler.tick(start + secs(60)));
        assert!(scheduler.tick(start + secs(65)));
    }

    #[test]
    fn test_custom_policy() {
        let start = Instant::now();
        let policy = FlushPolicy::default()
            .with_max_mutations(2)
            .with_check_interval(secs(1));
        let mut scheduler = FlushScheduler::new(policy, start);
        scheduler.record_mutation();
        scheduler.record_mutation();
        assert!(scheduler.tick(start + secs(1)));
    }
}
