use std::io::{Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::socket::{
    connect, setsockopt, socket, sockopt, AddressFamily, SockFlag, SockType, UnixAddr,
};
use nix::sys::time::{TimeVal, TimeValLike};

use quorumgate_core::config::TransportConfig;
use quorumgate_core::{ConsensusRequest, ConsensusResponse, TransportError};

use crate::ConsensusTransport;

/// Largest verdict record read back from the backend.
const RESPONSE_LIMIT: usize = 256;

/// Lightweight text protocol over a local stream socket: one
/// `operation|details` write, one read, approval only on an exact token match.
#[derive(Debug, Clone)]
pub struct SocketTransport {
    socket_path: PathBuf,
    approval_token: String,
    timeout: Duration,
}

impl SocketTransport {
    pub fn new(
        socket_path: impl Into<PathBuf>,
        approval_token: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            socket_path: socket_path.into(),
            approval_token: approval_token.into(),
            timeout,
        }
    }

    pub fn from_config(config: &TransportConfig) -> Self {
        Self::new(
            config.socket_path.clone(),
            config.approval_token.clone(),
            config.timeout(),
        )
    }

    fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }

    /// Connects with the send timeout armed, which also bounds the wait on
    /// a listener whose backlog is full.
    fn open_session(&self, deadline: Instant, timeout_ms: u64) -> Result<UnixStream, TransportError> {
        let unavailable = |err: Errno| {
            TransportError::Unavailable(format!("connect {}: {err}", self.socket_path.display()))
        };
        let fd = socket(AddressFamily::Unix, SockType::Stream, SockFlag::SOCK_CLOEXEC, None)
            .map_err(unavailable)?;
        let budget = remaining(deadline, timeout_ms)?;
        let micros = budget.as_micros().clamp(1, i64::MAX as u128) as i64;
        setsockopt(&fd, sockopt::SendTimeout, &TimeVal::microseconds(micros)).map_err(unavailable)?;
        let addr = UnixAddr::new(&self.socket_path).map_err(unavailable)?;
        match connect(fd.as_raw_fd(), &addr) {
            Ok(()) => Ok(UnixStream::from(fd)),
            Err(Errno::EAGAIN | Errno::EINPROGRESS) => Err(TransportError::Timeout(timeout_ms)),
            Err(err) => Err(unavailable(err)),
        }
    }

    fn interpret(&self, reply: &[u8]) -> ConsensusResponse {
        if reply == self.approval_token.as_bytes() {
            return ConsensusResponse::approved();
        }
        let shown = String::from_utf8_lossy(reply);
        let shown: String = shown.chars().take(64).collect();
        ConsensusResponse::denied(format!("backend replied {shown:?}"))
    }
}

impl ConsensusTransport for SocketTransport {
    fn name(&self) -> &'static str {
        "socket"
    }

    fn request(&self, request: &ConsensusRequest) -> Result<ConsensusResponse, TransportError> {
        let record = request
            .encode_record()
            .map_err(|err| TransportError::Protocol(err.to_string()))?;
        let deadline = Instant::now() + self.timeout;
        let timeout_ms = self.timeout_ms();

        let mut stream = self.open_session(deadline, timeout_ms)?;
        stream
            .set_write_timeout(Some(remaining(deadline, timeout_ms)?))
            .map_err(|err| TransportError::from_io(&err, timeout_ms))?;
        stream
            .write_all(record.as_bytes())
            .map_err(|err| TransportError::from_io(&err, timeout_ms))?;

        stream
            .set_read_timeout(Some(remaining(deadline, timeout_ms)?))
            .map_err(|err| TransportError::from_io(&err, timeout_ms))?;
        let mut buf = [0u8; RESPONSE_LIMIT];
        let bytes = stream
            .read(&mut buf)
            .map_err(|err| TransportError::from_io(&err, timeout_ms))?;
        if bytes == 0 {
            return Err(TransportError::Protocol(
                "connection closed without a verdict".to_string(),
            ));
        }

        let response = self.interpret(&buf[..bytes]);
        tracing::debug!(
            request_id = %request.id,
            approved = response.approved,
            "socket verdict received"
        );
        Ok(response)
    }
}

pub(crate) fn remaining(deadline: Instant, timeout_ms: u64) -> Result<Duration, TransportError> {
    let left = deadline.saturating_duration_since(Instant::now());
    if left.is_zero() {
        return Err(TransportError::Timeout(timeout_ms));
    }
    Ok(left)
}
