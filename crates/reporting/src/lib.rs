use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

pub mod audit;
pub mod json;

pub use audit::{AuditRecord, AuditSink, MemoryAuditSink, TracingAuditSink};

/// Snapshot of the gate counters. Counters only ever grow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateStats {
    pub observed: u64,
    pub consensus_requests: u64,
    pub approved: u64,
    pub denied: u64,
    pub transport_errors: u64,
}

impl GateStats {
    /// Share of consensus requests that came back approved.
    pub fn approval_rate(&self) -> Option<f64> {
        if self.consensus_requests == 0 {
            return None;
        }
        Some(self.approved as f64 / self.consensus_requests as f64)
    }

    pub fn blocked(&self) -> u64 {
        self.denied.saturating_add(self.transport_errors)
    }
}

/// End-of-process report for one gated process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateSummary {
    pub session_id: Uuid,
    pub pid: u32,
    pub started_at: OffsetDateTime,
    pub ended_at: OffsetDateTime,
    pub stats: GateStats,
}

impl GateSummary {
    pub fn new(pid: u32, started_at: OffsetDateTime, stats: GateStats) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            pid,
            started_at,
            ended_at: OffsetDateTime::now_utc(),
            stats,
        }
    }

    pub fn duration(&self) -> Duration {
        self.ended_at - self.started_at
    }

    pub fn human_summary(&self) -> String {
        let stats = &self.stats;
        let rate = stats
            .approval_rate()
            .map(|rate| format!("{:.1}%", rate * 100.0))
            .unwrap_or_else(|| "n/a".to_string());
        let verdict_line = if stats.blocked() == 0 {
            "No gated operation was blocked.".to_string()
        } else {
            format!("{} gated operations were blocked.", stats.blocked())
        };

        format!(
            "quorumgate: pid {pid} ran for {duration}.\n\
             Operations observed: {observed}\n\
             Consensus requests: {requests}\n\
             Approved: {approved}\n\
             Denied: {denied}\n\
             Transport errors: {errors}\n\
             Approval rate: {rate}\n\
             {verdict_line}",
            pid = self.pid,
            duration = format_duration(self.duration()),
            observed = stats.observed,
            requests = stats.consensus_requests,
            approved = stats.approved,
            denied = stats.denied,
            errors = stats.transport_errors,
        )
    }
}

fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_seconds_f64().max(0.0) as i64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats() -> GateStats {
        GateStats {
            observed: 40,
            consensus_requests: 4,
            approved: 3,
            denied: 1,
            transport_errors: 0,
        }
    }

    #[test]
    fn approval_rate_is_over_requests() {
        assert_eq!(stats().approval_rate(), Some(0.75));
        assert_eq!(GateStats::default().approval_rate(), None);
    }

    #[test]
    fn human_summary_lists_counters() {
        let started = OffsetDateTime::now_utc() - Duration::seconds(75);
        let summary = GateSummary::new(4242, started, stats());
        let text = summary.human_summary();
        assert!(text.contains("pid 4242 ran for 1m 15s"));
        assert!(text.contains("Consensus requests: 4"));
        assert!(text.contains("Approval rate: 75.0%"));
        assert!(text.contains("1 gated operations were blocked."));
    }

    #[test]
    fn empty_summary_has_no_rate() {
        let summary = GateSummary::new(1, OffsetDateTime::now_utc(), GateStats::default());
        let text = summary.human_summary();
        assert!(text.contains("Approval rate: n/a"));
        assert!(text.contains("No gated operation was blocked."));
    }
}
