use quorumgate_core::types::InterceptedCall;

use crate::classification::Classification;

pub const MEMORY_LABEL: &str = "Memory";

/// Large mappings are gated as a resource-exhaustion control.
pub fn evaluate_mapping(call: &InterceptedCall, threshold: u64) -> Classification {
    let size = call.metadata.size.unwrap_or(0);
    if size > threshold {
        return Classification::required(
            format!("Mapping of {size} bytes exceeds {threshold} byte threshold"),
            MEMORY_LABEL,
        );
    }
    Classification::passthrough("Mapping below threshold")
}
