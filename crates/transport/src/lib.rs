//! Consensus transports.
//!
//! A transport turns one [`ConsensusRequest`] into exactly one
//! [`ConsensusResponse`] or one [`TransportError`], within the configured
//! time budget. Sessions are never pooled or retried: every call opens,
//! uses and closes its own connection.

use quorumgate_core::config::{Backend, TransportConfig};
use quorumgate_core::{ConsensusRequest, ConsensusResponse, TransportError};

pub mod rpc;
pub mod socket;

pub use rpc::RpcTransport;
pub use socket::SocketTransport;

pub trait ConsensusTransport: Send + Sync {
    fn name(&self) -> &'static str;

    fn request(&self, request: &ConsensusRequest) -> Result<ConsensusResponse, TransportError>;
}

/// Builds the backend selected in configuration.
pub fn from_config(config: &TransportConfig) -> Box<dyn ConsensusTransport> {
    match config.backend {
        Backend::Socket => Box::new(SocketTransport::from_config(config)),
        Backend::Rpc => Box::new(RpcTransport::from_config(config)),
    }
}
