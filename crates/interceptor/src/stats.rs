use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use time::OffsetDateTime;

use reporting::{GateStats, GateSummary};

/// Process-wide counters. Every mutation happens under one lock, held only
/// for the increment itself.
#[derive(Debug)]
pub struct Statistics {
    counters: Mutex<GateStats>,
    started_at: OffsetDateTime,
    finalized: AtomicBool,
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new()
    }
}

impl Statistics {
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(GateStats::default()),
            started_at: OffsetDateTime::now_utc(),
            finalized: AtomicBool::new(false),
        }
    }

    fn bump(&self, update: impl FnOnce(&mut GateStats)) {
        let mut counters = self
            .counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        update(&mut counters);
    }

    pub fn record_observed(&self) {
        self.bump(|stats| stats.observed = stats.observed.saturating_add(1));
    }

    pub fn record_request(&self) {
        self.bump(|stats| stats.consensus_requests = stats.consensus_requests.saturating_add(1));
    }

    pub fn record_approved(&self) {
        self.bump(|stats| stats.approved = stats.approved.saturating_add(1));
    }

    pub fn record_denied(&self) {
        self.bump(|stats| stats.denied = stats.denied.saturating_add(1));
    }

    pub fn record_transport_error(&self) {
        self.bump(|stats| stats.transport_errors = stats.transport_errors.saturating_add(1));
    }

    pub fn snapshot(&self) -> GateStats {
        *self
            .counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Produces the exit summary. Only the first caller gets it.
    pub fn finalize(&self) -> Option<GateSummary> {
        if self.finalized.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(GateSummary::new(std::process::id(), self.started_at, self.snapshot()))
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn concurrent_increments_are_not_lost() {
        let stats = Arc::new(Statistics::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = Arc::clone(&stats);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        stats.record_observed();
                        stats.record_request();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.observed, 8000);
        assert_eq!(snapshot.consensus_requests, 8000);
    }

    #[test]
    fn finalize_runs_once() {
        let stats = Statistics::new();
        stats.record_observed();
        stats.record_approved();

        let summary = stats.finalize().expect("first finalize yields a summary");
        assert_eq!(summary.stats.observed, 1);
        assert!(stats.finalize().is_none());
        assert!(stats.is_finalized());
    }
}
