use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

/// In-process, time-windowed tracker of failed logins per account email.
///
/// Process-local by construction; a multi-instance deployment would need a
/// shared store behind the same interface. Records are lost on restart.
pub struct LoginAttemptTracker {
    threshold: usize,
    window: Duration,
    attempts: DashMap<String, Vec<FailedAttempt>>,
}

#[derive(Debug, Clone)]
struct FailedAttempt {
    at: DateTime<Utc>,
    origin: String,
}

impl LoginAttemptTracker {
    pub fn new(threshold: usize, window_minutes: i64) -> Self {
        Self {
            threshold,
            window: Duration::minutes(window_minutes),
            attempts: DashMap::new(),
        }
    }

    /// Record a failed login. Returns true when this failure is exactly the
    /// threshold-th within the window, so the caller escalates exactly once.
    pub fn record_failure(&self, email: &str, origin: &str) -> bool {
        self.record_failure_at(email, origin, Utc::now())
    }

    fn record_failure_at(&self, email: &str, origin: &str, at: DateTime<Utc>) -> bool {
        // The entry guard holds a per-key lock, so concurrent failures for
        // the same email cannot lose updates or double-trip the threshold.
        let mut entry = self.attempts.entry(email.to_lowercase()).or_default();
        let cutoff = at - self.window;
        entry.retain(|a| a.at > cutoff);
        entry.push(FailedAttempt {
            at,
            origin: origin.to_string(),
        });
        entry.len() == self.threshold
    }

    /// Distinct origin addresses seen within the current window for an email.
    pub fn recent_origins(&self, email: &str) -> Vec<String> {
        match self.attempts.get(&email.to_lowercase()) {
            Some(entry) => {
                let mut origins: Vec<String> = entry.iter().map(|a| a.origin.clone()).collect();
                origins.sort();
                origins.dedup();
                origins
            }
            None => Vec::new(),
        }
    }

    /// Successful login resets the record entirely.
    pub fn clear(&self, email: &str) {
        self.attempts.remove(&email.to_lowercase());
    }

    /// Purge expired entries and drop empty keys. Correctness does not
    /// depend on this; it only bounds memory for abandoned keys.
    pub fn sweep(&self) {
        let cutoff = Utc::now() - self.window;
        self.attempts.retain(|_, entries| {
            entries.retain(|a| a.at > cutoff);
            !entries.is_empty()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_fires_exactly_once() {
        let tracker = LoginAttemptTracker::new(5, 30);

        for _ in 0..4 {
            assert!(!tracker.record_failure("a@example.com", "10.0.0.1"));
        }
        assert!(tracker.record_failure("a@example.com", "10.0.0.1"));
        assert!(!tracker.record_failure("a@example.com", "10.0.0.1"));
    }

    #[test]
    fn failures_outside_window_do_not_count() {
        let tracker = LoginAttemptTracker::new(5, 30);
        let stale = Utc::now() - Duration::minutes(31);

        for _ in 0..4 {
            tracker.record_failure_at("a@example.com", "10.0.0.1", stale);
        }
        // Stale entries are purged on the next record, so this is failure #1,
        // not #5.
        assert!(!tracker.record_failure("a@example.com", "10.0.0.1"));
    }

    #[test]
    fn success_clears_the_record() {
        let tracker = LoginAttemptTracker::new(5, 30);

        for _ in 0..4 {
            tracker.record_failure("a@example.com", "10.0.0.1");
        }
        tracker.clear("a@example.com");
        for _ in 0..4 {
            assert!(!tracker.record_failure("a@example.com", "10.0.0.1"));
        }
    }

    #[test]
    fn emails_are_tracked_independently_and_case_insensitively() {
        let tracker = LoginAttemptTracker::new(2, 30);

        assert!(!tracker.record_failure("a@example.com", "10.0.0.1"));
        assert!(!tracker.record_failure("b@example.com", "10.0.0.1"));
        assert!(tracker.record_failure("A@Example.Com", "10.0.0.1"));
    }

    #[test]
    fn sweep_drops_expired_keys() {
        let tracker = LoginAttemptTracker::new(5, 30);
        let stale = Utc::now() - Duration::minutes(31);

        tracker.record_failure_at("old@example.com", "10.0.0.1", stale);
        tracker.record_failure("fresh@example.com", "10.0.0.2");

        tracker.sweep();
        assert!(tracker.attempts.get("old@example.com").is_none());
        assert!(tracker.attempts.get("fresh@example.com").is_some());
    }

    #[test]
    fn recent_origins_are_deduplicated() {
        let tracker = LoginAttemptTracker::new(10, 30);

        tracker.record_failure("a@example.com", "10.0.0.1");
        tracker.record_failure("a@example.com", "10.0.0.1");
        tracker.record_failure("a@example.com", "10.0.0.2");

        assert_eq!(tracker.recent_origins("a@example.com").len(), 2);
    }
}
