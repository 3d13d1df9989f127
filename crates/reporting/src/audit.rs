use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use policy_engine::{Classification, ConsensusOutcome, Verdict};
use quorumgate_core::{InterceptedCall, OperationKind, Votes};

/// Target used for every audit event, so audit output can be filtered
/// independently of diagnostics.
pub const AUDIT_TARGET: &str = "quorumgate::audit";

/// Outcome label for calls that never needed a backend.
pub const PASSTHROUGH: &str = "passthrough";

/// Outcome label for gated calls denied before any request was sent.
pub const NOT_REQUESTED: &str = "not_requested";

/// One record per gating decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: OffsetDateTime,
    pub operation: OperationKind,
    pub resource: String,
    pub requires_consensus: bool,
    pub rule: Option<String>,
    pub outcome: String,
    pub reason: String,
    pub votes: Option<Votes>,
    pub verdict: Verdict,
}

impl AuditRecord {
    pub fn new(
        call: &InterceptedCall,
        classification: &Classification,
        outcome: Option<&ConsensusOutcome>,
        verdict: Verdict,
    ) -> Self {
        let (label, reason, votes) = match outcome {
            Some(outcome) => (outcome.label().to_string(), outcome.reason(), outcome.votes()),
            None if classification.requires_consensus => {
                (NOT_REQUESTED.to_string(), classification.reason.clone(), None)
            }
            None => (PASSTHROUGH.to_string(), classification.reason.clone(), None),
        };
        Self {
            timestamp: OffsetDateTime::now_utc(),
            operation: call.kind,
            resource: call.resource.describe(),
            requires_consensus: classification.requires_consensus,
            rule: classification.zone_label.clone(),
            outcome: label,
            reason,
            votes,
            verdict,
        }
    }
}

pub trait AuditSink: Send + Sync {
    fn record(&self, record: &AuditRecord);
}

/// Emits each record as a structured `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: &AuditRecord) {
        let timestamp = record
            .timestamp
            .format(&Rfc3339)
            .unwrap_or_else(|_| record.timestamp.unix_timestamp().to_string());
        let rule = record.rule.as_deref().unwrap_or("-");
        let votes_for = record.votes.map(|votes| votes.votes_for);
        let votes_against = record.votes.map(|votes| votes.votes_against);

        match (record.requires_consensus, record.verdict) {
            (false, _) => tracing::debug!(
                target: AUDIT_TARGET,
                %timestamp,
                operation = record.operation.as_str(),
                resource = %record.resource,
                outcome = %record.outcome,
                verdict = "allow",
                "{}",
                record.reason
            ),
            (true, Verdict::Allow) => tracing::info!(
                target: AUDIT_TARGET,
                %timestamp,
                operation = record.operation.as_str(),
                resource = %record.resource,
                rule,
                outcome = %record.outcome,
                votes_for,
                votes_against,
                verdict = "allow",
                "{}",
                record.reason
            ),
            (true, Verdict::Deny) => tracing::warn!(
                target: AUDIT_TARGET,
                %timestamp,
                operation = record.operation.as_str(),
                resource = %record.resource,
                rule,
                outcome = %record.outcome,
                votes_for,
                votes_against,
                verdict = "deny",
                "{}",
                record.reason
            ),
        }
    }
}

/// Keeps records in memory; used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: &AuditRecord) {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record.clone());
    }
}
