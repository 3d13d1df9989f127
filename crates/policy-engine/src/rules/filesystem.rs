use std::path::Path;

use quorumgate_core::paths::SensitivePath;

use crate::classification::Classification;

/// Write-type access (write-open, write, chmod, unlink) against the
/// sensitive-path table.
pub fn evaluate_modification(path: &Path, zones: &[SensitivePath]) -> Classification {
    for zone in zones {
        if zone.matches(path) {
            return Classification::required(
                format!("Modification of {} requires consensus", zone.label),
                &zone.label,
            );
        }
    }

    Classification::passthrough("Path outside sensitive zones")
}

/// Reads only need consensus for the enumerated secret files.
pub fn evaluate_read(path: &Path, secret_files: &[SensitivePath]) -> Classification {
    for secret in secret_files {
        if secret.matches(path) {
            return Classification::required(
                format!("Read of secret file {} requires consensus", secret.pattern),
                &secret.label,
            );
        }
    }

    Classification::passthrough("Read of non-secret file")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zones() -> Vec<SensitivePath> {
        vec![
            SensitivePath::prefix("System configuration", "/etc/"),
            SensitivePath::prefix("Boot", "/boot/"),
            SensitivePath::segment("Credential store", "/.ssh/"),
        ]
    }

    #[test]
    fn sensitive_prefixes_require_consensus() {
        let decision = evaluate_modification(Path::new("/etc/hosts"), &zones());
        assert!(decision.requires_consensus);
        assert_eq!(decision.zone_label.as_deref(), Some("System configuration"));

        let decision = evaluate_modification(Path::new("/home/bob/.ssh/authorized_keys"), &zones());
        assert!(decision.requires_consensus);
        assert_eq!(decision.tag(), "Credential store");
    }

    #[test]
    fn user_paths_pass() {
        let decision = evaluate_modification(Path::new("/home/bob/notes.txt"), &zones());
        assert!(!decision.requires_consensus);
        assert_eq!(decision.tag(), "unclassified");
    }

    #[test]
    fn reads_only_gate_secret_files() {
        let secrets = vec![SensitivePath::exact("Secret file", "/etc/shadow")];
        assert!(evaluate_read(Path::new("/etc/shadow"), &secrets).requires_consensus);
        assert!(!evaluate_read(Path::new("/etc/hostname"), &secrets).requires_consensus);
    }
}
