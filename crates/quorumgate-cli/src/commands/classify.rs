use std::path::PathBuf;

use anyhow::Result;

use policy_engine::Classifier;
use quorumgate_core::config::Config;
use quorumgate_core::OperationKind;

pub struct ClassifyInputs {
    pub config_path: Option<PathBuf>,
    pub operation: OperationKind,
    pub path: Option<PathBuf>,
    pub flags: Option<i64>,
    pub size: Option<u64>,
    pub json: bool,
}

pub fn execute(inputs: ClassifyInputs) -> Result<()> {
    let config = Config::resolve(inputs.config_path.as_deref())?;
    let classifier = Classifier::from_config(&config.classifier);
    let call = super::build_call(inputs.operation, inputs.path, inputs.flags, inputs.size);
    let classification = classifier.classify(&call);

    if inputs.json {
        println!("{}", serde_json::to_string_pretty(&classification)?);
        return Ok(());
    }

    let required = if classification.requires_consensus { "yes" } else { "no" };
    println!("Operation: {} {}", call.kind, call.resource.describe());
    println!("Consensus required: {required}");
    println!("Rule: {}", classification.tag());
    println!("Reason: {}", classification.reason);
    Ok(())
}
