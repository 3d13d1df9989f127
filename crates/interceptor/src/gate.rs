use std::sync::Arc;

use policy_engine::{decide, Classification, Classifier, ConsensusOutcome, Verdict};
use quorumgate_core::config::{Config, UnresolvedDescriptorPolicy};
use quorumgate_core::{
    ConsensusRequest, ConsensusResponse, GateError, InterceptedCall, Resource, TransportError,
};
use reporting::{AuditRecord, AuditSink, TracingAuditSink};
use transport::ConsensusTransport;

use crate::stats::Statistics;

const UNRESOLVED_LABEL: &str = "Unresolved descriptor";
const UNREADABLE_LABEL: &str = "Unreadable argument";

/// Everything the gate decided about one call.
#[derive(Debug, Clone)]
pub struct GateDecision {
    pub verdict: Verdict,
    pub classification: Classification,
    pub outcome: Option<ConsensusOutcome>,
}

impl GateDecision {
    pub fn is_allow(&self) -> bool {
        self.verdict.is_allow()
    }

    /// Why the call must fail, if it must.
    pub fn error(&self) -> Option<GateError> {
        if self.verdict.is_allow() {
            return None;
        }
        let err = match &self.outcome {
            Some(ConsensusOutcome::TransportError(err)) => GateError::from(err.clone()),
            Some(outcome) => GateError::ConsensusDenied(outcome.reason()),
            None => GateError::ConsensusDenied(self.classification.reason.clone()),
        };
        Some(err)
    }

    /// Errno to hand back to the caller, if the call must fail.
    pub fn errno(&self) -> Option<i32> {
        self.error().as_ref().map(GateError::errno)
    }
}

/// The classification, consensus and decision pipeline behind every
/// interception provider. Safe to share across threads; the only shared
/// mutable state is the statistics lock.
pub struct Gate {
    enabled: bool,
    unresolved: UnresolvedDescriptorPolicy,
    classifier: Classifier,
    transport: Box<dyn ConsensusTransport>,
    audit: Arc<dyn AuditSink>,
    stats: Statistics,
}

impl Gate {
    pub fn new(
        config: &Config,
        transport: Box<dyn ConsensusTransport>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            enabled: config.gate.enabled,
            unresolved: config.gate.unresolved_descriptor,
            classifier: Classifier::from_config(&config.classifier),
            transport,
            audit,
            stats: Statistics::new(),
        }
    }

    /// Gate wired to the configured backend, auditing through `tracing`.
    pub fn from_config(config: &Config) -> Self {
        let transport = transport::from_config(&config.transport);
        tracing::debug!(
            backend = transport.name(),
            enabled = config.gate.enabled,
            "consensus gate ready"
        );
        Self::new(config, transport, Arc::new(TracingAuditSink))
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn stats(&self) -> &Statistics {
        &self.stats
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    /// Runs one call through the pipeline and emits exactly one audit record.
    pub fn check(&self, call: &InterceptedCall) -> GateDecision {
        self.stats.record_observed();

        if let Some(classification) = self.unresolved_denial(call) {
            self.stats.record_denied();
            return self.conclude(call, classification, None);
        }
        let classification = if self.enabled {
            self.classifier.classify(call)
        } else {
            Classification::passthrough("Gate disabled")
        };
        if !classification.requires_consensus {
            return self.conclude(call, classification, None);
        }

        self.stats.record_request();
        let outcome = ConsensusOutcome::from_result(self.request(call, &classification));
        match &outcome {
            ConsensusOutcome::Approved(_) => self.stats.record_approved(),
            ConsensusOutcome::Denied(_) => self.stats.record_denied(),
            ConsensusOutcome::TransportError(err) => {
                tracing::debug!(error = %err, "consensus round trip failed");
                self.stats.record_transport_error();
            }
        }
        self.conclude(call, classification, Some(outcome))
    }

    /// Denies a call without consulting the backend, for calls whose
    /// arguments could not be captured.
    pub fn reject(&self, call: &InterceptedCall, reason: impl Into<String>) -> GateDecision {
        self.stats.record_observed();
        self.stats.record_denied();
        self.conclude(call, Classification::required(reason, UNREADABLE_LABEL), None)
    }

    fn unresolved_denial(&self, call: &InterceptedCall) -> Option<Classification> {
        match (&call.resource, self.unresolved) {
            (Resource::Unresolved(fd), UnresolvedDescriptorPolicy::Deny) if self.enabled => {
                Some(Classification::required(
                    format!("Descriptor {fd} could not be resolved"),
                    UNRESOLVED_LABEL,
                ))
            }
            _ => None,
        }
    }

    fn request(
        &self,
        call: &InterceptedCall,
        classification: &Classification,
    ) -> Result<ConsensusResponse, TransportError> {
        let request = ConsensusRequest::from_call(call, classification.tag());
        self.transport.request(&request)
    }

    fn conclude(
        &self,
        call: &InterceptedCall,
        classification: Classification,
        outcome: Option<ConsensusOutcome>,
    ) -> GateDecision {
        let verdict = decide(classification.requires_consensus, outcome.as_ref());
        self.audit
            .record(&AuditRecord::new(call, &classification, outcome.as_ref(), verdict));
        GateDecision {
            verdict,
            classification,
            outcome,
        }
    }
}
