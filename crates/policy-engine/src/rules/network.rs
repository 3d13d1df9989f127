use quorumgate_core::types::{InterceptedCall, OperationKind};

use crate::classification::Classification;

pub const NETWORK_LABEL: &str = "Network";

/// Socket creation and outbound connects are always gated.
pub fn evaluate_network(call: &InterceptedCall) -> Classification {
    let reason = match call.kind {
        OperationKind::SocketCreate => "Socket creation requires consensus",
        _ => "Network connection requires consensus",
    };
    Classification::required(reason, NETWORK_LABEL)
}
