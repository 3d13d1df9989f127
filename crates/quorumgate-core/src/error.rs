use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures of a single consensus round trip. Every variant resolves to deny.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum TransportError {
    #[error("consensus backend unavailable: {0}")]
    Unavailable(String),
    #[error("consensus backend timed out after {0} ms")]
    Timeout(u64),
    #[error("consensus protocol error: {0}")]
    Protocol(String),
}

impl TransportError {
    pub fn label(&self) -> &'static str {
        match self {
            TransportError::Unavailable(_) => "transport_unavailable",
            TransportError::Timeout(_) => "timeout",
            TransportError::Protocol(_) => "protocol_error",
        }
    }

    /// Maps an I/O failure during an established session.
    pub fn from_io(err: &std::io::Error, timeout_ms: u64) -> Self {
        match err.kind() {
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => {
                TransportError::Timeout(timeout_ms)
            }
            std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::NotFound
            | std::io::ErrorKind::PermissionDenied
            | std::io::ErrorKind::AddrNotAvailable => TransportError::Unavailable(err.to_string()),
            _ => TransportError::Protocol(err.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum GateError {
    #[error("consensus backend unavailable: {0}")]
    TransportUnavailable(String),
    #[error("no consensus verdict within {0} ms")]
    Timeout(u64),
    #[error("unrecognized consensus response: {0}")]
    ProtocolError(String),
    #[error("operation denied by consensus: {0}")]
    ConsensusDenied(String),
    #[error("cannot resolve libc symbol {0}")]
    OriginalUnresolved(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("request encoding failed: {0}")]
    Encoding(String),
}

impl GateError {
    /// Errno surfaced to the intercepted caller.
    pub fn errno(&self) -> i32 {
        libc::EPERM
    }
}

impl From<TransportError> for GateError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Unavailable(msg) => GateError::TransportUnavailable(msg),
            TransportError::Timeout(ms) => GateError::Timeout(ms),
            TransportError::Protocol(msg) => GateError::ProtocolError(msg),
        }
    }
}
