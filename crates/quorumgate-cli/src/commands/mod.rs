pub mod ask;
pub mod classify;
pub mod config;
pub mod run;

use quorumgate_core::{InterceptedCall, OperationKind, Resource};
use std::path::PathBuf;

pub(crate) fn build_call(
    operation: OperationKind,
    path: Option<PathBuf>,
    flags: Option<i64>,
    size: Option<u64>,
) -> InterceptedCall {
    let resource = path.map(Resource::Path).unwrap_or(Resource::None);
    let mut call = InterceptedCall::new(operation, resource);
    if let Some(flags) = flags {
        call = call.with_flags(flags);
    }
    if let Some(size) = size {
        call = call.with_size(size);
    }
    call
}
