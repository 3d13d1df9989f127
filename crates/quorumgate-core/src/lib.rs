pub mod config;
pub mod error;
pub mod paths;
pub mod types;
pub mod wire;

pub use config::{
    Backend, ClassifierConfig, Config, ConfigPaths, GateConfig, LoggingConfig,
    SensitivePrefixConfig, TransportConfig, UnresolvedDescriptorPolicy,
};
pub use error::{GateError, TransportError};
pub use paths::{MatchKind, SensitivePath};
pub use types::{CallMetadata, InterceptedCall, OperationKind, Resource};
pub use wire::{ConsensusRequest, ConsensusResponse, Votes, MAX_RECORD_LEN};
