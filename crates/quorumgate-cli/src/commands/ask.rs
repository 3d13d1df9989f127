use std::path::PathBuf;

use anyhow::Result;

use policy_engine::{decide, Classifier, ConsensusOutcome};
use quorumgate_core::config::Config;
use quorumgate_core::{ConsensusRequest, OperationKind};

/// Sends one request regardless of classification, so a backend can be
/// checked end to end.
pub fn execute(
    config_path: Option<PathBuf>,
    operation: OperationKind,
    path: PathBuf,
    flags: Option<i64>,
) -> Result<()> {
    let config = Config::resolve(config_path.as_deref())?;
    interceptor::logging::init_tracing(&config.logging);

    let classifier = Classifier::from_config(&config.classifier);
    let call = super::build_call(operation, Some(path), flags, None);
    let classification = classifier.classify(&call);
    let request = ConsensusRequest::from_call(&call, classification.tag());

    let transport = transport::from_config(&config.transport);
    let outcome = ConsensusOutcome::from_result(transport.request(&request));
    let verdict = decide(true, Some(&outcome));

    println!("Backend: {}", transport.name());
    println!("Request: {}", request.id);
    println!("Outcome: {}", outcome.label());
    if let Some(votes) = outcome.votes() {
        println!("Votes: {} for / {} against", votes.votes_for, votes.votes_against);
    }
    println!("Reason: {}", outcome.reason());
    println!("Verdict: {}", if verdict.is_allow() { "allow" } else { "deny" });
    Ok(())
}
