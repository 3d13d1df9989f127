use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The closed set of operations the gate monitors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    ProcessExec,
    ProcessFork,
    FileOpen,
    FileRead,
    FileWrite,
    FileDelete,
    PermissionChange,
    SocketCreate,
    NetworkConnect,
    MemoryMap,
}

impl OperationKind {
    pub const ALL: [OperationKind; 10] = [
        OperationKind::ProcessExec,
        OperationKind::ProcessFork,
        OperationKind::FileOpen,
        OperationKind::FileRead,
        OperationKind::FileWrite,
        OperationKind::FileDelete,
        OperationKind::PermissionChange,
        OperationKind::SocketCreate,
        OperationKind::NetworkConnect,
        OperationKind::MemoryMap,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::ProcessExec => "process_exec",
            OperationKind::ProcessFork => "process_fork",
            OperationKind::FileOpen => "file_open",
            OperationKind::FileRead => "file_read",
            OperationKind::FileWrite => "file_write",
            OperationKind::FileDelete => "file_delete",
            OperationKind::PermissionChange => "permission_change",
            OperationKind::SocketCreate => "socket_create",
            OperationKind::NetworkConnect => "network_connect",
            OperationKind::MemoryMap => "memory_map",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase().replace('-', "_");
        OperationKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| format!("unknown operation kind: {value}"))
    }
}

/// What an intercepted call acts upon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Resource {
    /// A filesystem path, exactly as the caller passed it or as the
    /// descriptor resolved to.
    Path(PathBuf),
    /// A descriptor whose path could not be determined.
    Unresolved(i32),
    /// Operations with no filesystem resource (fork, socket, anonymous mmap).
    None,
}

impl Resource {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Resource::Path(path) => Some(path),
            _ => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Resource::Path(path) => path.display().to_string(),
            Resource::Unresolved(fd) => format!("fd:{fd}"),
            Resource::None => "-".to_string(),
        }
    }
}

/// Operation-specific arguments captured alongside the call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flags: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl CallMetadata {
    /// Key/value view used by the wire encoders. Order is stable.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = Vec::new();
        if let Some(flags) = self.flags {
            fields.push(("flags", flags.to_string()));
        }
        if let Some(mode) = self.mode {
            fields.push(("mode", format!("{mode:o}")));
        }
        if let Some(size) = self.size {
            fields.push(("size", size.to_string()));
        }
        if let Some(pid) = self.pid {
            fields.push(("pid", pid.to_string()));
        }
        if !self.args.is_empty() {
            fields.push(("args", self.args.join(" ")));
        }
        if let Some(note) = &self.note {
            fields.push(("note", note.clone()));
        }
        fields
    }
}

/// A captured call to a monitored operation. Read-only once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterceptedCall {
    pub kind: OperationKind,
    pub resource: Resource,
    #[serde(default)]
    pub metadata: CallMetadata,
}

impl InterceptedCall {
    pub fn new(kind: OperationKind, resource: Resource) -> Self {
        Self {
            kind,
            resource,
            metadata: CallMetadata::default(),
        }
    }

    pub fn on_path(kind: OperationKind, path: impl Into<PathBuf>) -> Self {
        Self::new(kind, Resource::Path(path.into()))
    }

    pub fn with_flags(mut self, flags: i64) -> Self {
        self.metadata.flags = Some(flags);
        self
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.metadata.mode = Some(mode);
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.metadata.size = Some(size);
        self
    }

    pub fn with_pid(mut self, pid: i32) -> Self {
        self.metadata.pid = Some(pid);
        self
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.metadata.args = args;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.metadata.note = Some(note.into());
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.resource.path()
    }

    /// True for an open whose flags request write access, creation or truncation.
    pub fn is_write_open(&self) -> bool {
        if self.kind != OperationKind::FileOpen {
            return false;
        }
        let flags = self.metadata.flags.unwrap_or(0) as libc::c_int;
        let write_mask = libc::O_CREAT | libc::O_TRUNC | libc::O_APPEND;
        let access = flags & libc::O_ACCMODE;
        access == libc::O_WRONLY || access == libc::O_RDWR || flags & write_mask != 0
    }
}
