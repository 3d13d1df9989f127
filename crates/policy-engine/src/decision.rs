use serde::{Deserialize, Serialize};

use quorumgate_core::{ConsensusResponse, TransportError, Votes};

/// Final answer for one intercepted call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Allow,
    Deny,
}

impl Verdict {
    pub fn is_allow(&self) -> bool {
        matches!(self, Verdict::Allow)
    }
}

/// Result of the single consensus attempt made for a gated call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum ConsensusOutcome {
    Approved(ConsensusResponse),
    Denied(ConsensusResponse),
    TransportError(TransportError),
}

impl ConsensusOutcome {
    pub fn from_result(result: Result<ConsensusResponse, TransportError>) -> Self {
        match result {
            Ok(response) if response.approved => ConsensusOutcome::Approved(response),
            Ok(response) => ConsensusOutcome::Denied(response),
            Err(err) => ConsensusOutcome::TransportError(err),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConsensusOutcome::Approved(_) => "approved",
            ConsensusOutcome::Denied(_) => "denied",
            ConsensusOutcome::TransportError(err) => err.label(),
        }
    }

    pub fn votes(&self) -> Option<Votes> {
        match self {
            ConsensusOutcome::Approved(response) | ConsensusOutcome::Denied(response) => {
                response.votes
            }
            ConsensusOutcome::TransportError(_) => None,
        }
    }

    pub fn reason(&self) -> String {
        match self {
            ConsensusOutcome::Approved(response) | ConsensusOutcome::Denied(response) => {
                match (&response.reason, response.votes) {
                    (Some(reason), _) => reason.clone(),
                    (None, Some(votes)) => tally_reason(votes),
                    (None, None) if response.approved => "approved by consensus".to_string(),
                    (None, None) => "denied by consensus".to_string(),
                }
            }
            ConsensusOutcome::TransportError(err) => err.to_string(),
        }
    }
}

/// Human-readable form of a vote tally, e.g. `consensus 1 for / 4 against (1/5)`.
pub fn tally_reason(votes: Votes) -> String {
    format!(
        "consensus {} for / {} against ({}/{})",
        votes.votes_for,
        votes.votes_against,
        votes.votes_for,
        votes.total()
    )
}

/// Fail-secure combination of classifier output and transport result.
///
/// Only an explicit approval of a call that required consensus, or a call
/// that never required it, yields `Allow`.
pub fn decide(requires_consensus: bool, outcome: Option<&ConsensusOutcome>) -> Verdict {
    if !requires_consensus {
        return Verdict::Allow;
    }
    match outcome {
        Some(ConsensusOutcome::Approved(_)) => Verdict::Allow,
        Some(ConsensusOutcome::Denied(_)) | Some(ConsensusOutcome::TransportError(_)) | None => {
            Verdict::Deny
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn votes(votes_for: u32, votes_against: u32) -> Votes {
        Votes { votes_for, votes_against }
    }

    #[test]
    fn truth_table() {
        let approved = ConsensusOutcome::Approved(ConsensusResponse::approved());
        let denied = ConsensusOutcome::Denied(ConsensusResponse::denied("no"));
        let errors = [
            ConsensusOutcome::TransportError(TransportError::Unavailable("refused".into())),
            ConsensusOutcome::TransportError(TransportError::Timeout(10)),
            ConsensusOutcome::TransportError(TransportError::Protocol("garbage".into())),
        ];

        assert_eq!(decide(false, None), Verdict::Allow);
        assert_eq!(decide(false, Some(&denied)), Verdict::Allow);
        assert_eq!(decide(true, Some(&approved)), Verdict::Allow);
        assert_eq!(decide(true, Some(&denied)), Verdict::Deny);
        assert_eq!(decide(true, None), Verdict::Deny);
        for outcome in &errors {
            assert_eq!(decide(true, Some(outcome)), Verdict::Deny);
        }
    }

    #[test]
    fn outcome_from_result() {
        let outcome = ConsensusOutcome::from_result(Ok(ConsensusResponse::approved()));
        assert_eq!(outcome.label(), "approved");

        let outcome = ConsensusOutcome::from_result(Ok(ConsensusResponse::denied("policy")));
        assert_eq!(outcome.label(), "denied");
        assert_eq!(outcome.reason(), "policy");

        let outcome = ConsensusOutcome::from_result(Err(TransportError::Timeout(250)));
        assert_eq!(outcome.label(), "timeout");
        assert!(outcome.votes().is_none());
    }

    #[test]
    fn reason_falls_back_to_tally() {
        let response = ConsensusResponse {
            approved: false,
            votes: Some(votes(1, 4)),
            reason: None,
        };
        let outcome = ConsensusOutcome::from_result(Ok(response));
        assert_eq!(outcome.reason(), "consensus 1 for / 4 against (1/5)");
        assert_eq!(outcome.votes(), Some(votes(1, 4)));
    }
}
