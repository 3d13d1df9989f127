use quorumgate_core::config::ClassifierConfig;
use quorumgate_core::paths::SensitivePath;
use quorumgate_core::types::{InterceptedCall, OperationKind, Resource};

mod classification;
mod decision;
pub mod rules;
pub mod zones;

pub use classification::Classification;
pub use decision::{decide, tally_reason, ConsensusOutcome, Verdict};

/// Decides which intercepted calls need an external verdict.
///
/// The rule table is built once from configuration and never mutated, so a
/// classifier can be shared freely between threads.
#[derive(Debug, Clone)]
pub struct Classifier {
    sensitive_zones: Vec<SensitivePath>,
    secret_files: Vec<SensitivePath>,
    mmap_threshold: u64,
}

impl Classifier {
    /// Creates a new Classifier from configuration
    pub fn from_config(config: &ClassifierConfig) -> Self {
        Self {
            sensitive_zones: zones::sensitive::load_sensitive_zones(config),
            secret_files: zones::sensitive::load_secret_files(config),
            mmap_threshold: config.mmap_threshold_bytes,
        }
    }

    /// Classifies a call. Pure: no I/O, no shared state.
    pub fn classify(&self, call: &InterceptedCall) -> Classification {
        match call.kind {
            OperationKind::ProcessExec | OperationKind::ProcessFork => {
                rules::process::evaluate_process(call)
            }
            OperationKind::SocketCreate | OperationKind::NetworkConnect => {
                rules::network::evaluate_network(call)
            }
            OperationKind::MemoryMap => rules::memory::evaluate_mapping(call, self.mmap_threshold),
            OperationKind::FileRead => match &call.resource {
                Resource::Path(path) => rules::filesystem::evaluate_read(path, &self.secret_files),
                _ => unclassifiable(&call.resource),
            },
            OperationKind::FileOpen if !call.is_write_open() => {
                Classification::passthrough("Read-only open")
            }
            OperationKind::FileOpen
            | OperationKind::FileWrite
            | OperationKind::FileDelete
            | OperationKind::PermissionChange => match &call.resource {
                Resource::Path(path) => {
                    rules::filesystem::evaluate_modification(path, &self.sensitive_zones)
                }
                _ => unclassifiable(&call.resource),
            },
        }
    }

    pub fn requires_consensus(&self, call: &InterceptedCall) -> bool {
        self.classify(call).requires_consensus
    }

    pub fn mmap_threshold(&self) -> u64 {
        self.mmap_threshold
    }
}

fn unclassifiable(resource: &Resource) -> Classification {
    Classification::passthrough(format!("Cannot classify {}", resource.describe()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quorumgate_core::config::Config;

    fn create_test_classifier() -> Classifier {
        Classifier::from_config(&Config::default_config().classifier)
    }

    #[test]
    fn test_write_open_of_system_config() {
        let classifier = create_test_classifier();
        let call = InterceptedCall::on_path(OperationKind::FileOpen, "/etc/hosts")
            .with_flags((libc::O_WRONLY | libc::O_TRUNC) as i64);
        let decision = classifier.classify(&call);
        assert!(decision.requires_consensus);
        assert_eq!(decision.tag(), "System configuration");
    }

    #[test]
    fn test_read_only_open_passes() {
        let classifier = create_test_classifier();
        let call = InterceptedCall::on_path(OperationKind::FileOpen, "/etc/shadow")
            .with_flags(libc::O_RDONLY as i64);
        assert!(!classifier.requires_consensus(&call));
    }

    #[test]
    fn test_unresolved_descriptor_is_not_sensitive() {
        let classifier = create_test_classifier();
        let call = InterceptedCall::new(OperationKind::FileWrite, Resource::Unresolved(9));
        assert!(!classifier.requires_consensus(&call));
    }

    #[test]
    fn test_credential_marker_anywhere() {
        let classifier = create_test_classifier();
        let call = InterceptedCall::on_path(OperationKind::FileDelete, "/srv/deploy/.ssh/known_hosts");
        assert!(classifier.requires_consensus(&call));
    }

    #[test]
    fn test_always_gated_kinds() {
        let classifier = create_test_classifier();
        for kind in [
            OperationKind::ProcessExec,
            OperationKind::ProcessFork,
            OperationKind::SocketCreate,
            OperationKind::NetworkConnect,
        ] {
            assert!(classifier.requires_consensus(&InterceptedCall::new(kind, Resource::None)));
        }
    }
}
