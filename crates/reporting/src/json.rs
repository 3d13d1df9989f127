use crate::GateSummary;

pub fn render_json(summary: &GateSummary) -> String {
    serde_json::to_string_pretty(summary).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GateStats;
    use time::OffsetDateTime;

    #[test]
    fn summary_json_carries_counters() {
        let stats = GateStats {
            observed: 7,
            consensus_requests: 2,
            approved: 1,
            denied: 0,
            transport_errors: 1,
        };
        let summary = GateSummary::new(99, OffsetDateTime::now_utc(), stats);
        let value: serde_json::Value = serde_json::from_str(&render_json(&summary)).unwrap();
        assert_eq!(value["pid"], 99);
        assert_eq!(value["stats"]["transport_errors"], 1);
        assert_eq!(value["stats"]["observed"], 7);
    }
}
