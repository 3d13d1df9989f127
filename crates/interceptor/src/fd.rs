use std::path::PathBuf;

use quorumgate_core::Resource;

const DELETED_SUFFIX: &str = " (deleted)";

/// stdin, stdout and stderr are never gated.
pub fn is_standard_stream(fd: i32) -> bool {
    (0..=2).contains(&fd)
}

/// Maps a descriptor to the path it refers to through procfs.
///
/// `pid = None` resolves against the calling process. Descriptors for
/// pipes, sockets and anonymous inodes carry no filesystem identity and come
/// back as `Resource::None`; a lookup that fails outright (the descriptor was
/// closed, or procfs is unavailable) yields `Resource::Unresolved`.
pub fn resolve_descriptor(pid: Option<i32>, fd: i32) -> Resource {
    let link = match pid {
        Some(pid) => format!("/proc/{pid}/fd/{fd}"),
        None => format!("/proc/self/fd/{fd}"),
    };
    match std::fs::read_link(&link) {
        Ok(target) => classify_target(target),
        Err(_) => Resource::Unresolved(fd),
    }
}

fn classify_target(target: PathBuf) -> Resource {
    if !target.is_absolute() {
        return Resource::None;
    }
    match target.to_str().and_then(|raw| raw.strip_suffix(DELETED_SUFFIX)) {
        Some(original) => Resource::Path(PathBuf::from(original)),
        None => Resource::Path(target),
    }
}
