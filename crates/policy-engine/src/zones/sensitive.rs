use quorumgate_core::config::ClassifierConfig;
use quorumgate_core::paths::SensitivePath;

pub const CREDENTIAL_LABEL: &str = "Credential store";
pub const SECRET_LABEL: &str = "Secret file";

/// Prefix rules plus credential-store marker segments, in table order.
pub fn load_sensitive_zones(config: &ClassifierConfig) -> Vec<SensitivePath> {
    let mut zones: Vec<SensitivePath> = config
        .sensitive_prefixes
        .iter()
        .map(SensitivePath::from_config)
        .collect();
    zones.extend(
        config
            .credential_markers
            .iter()
            .map(|marker| SensitivePath::segment(CREDENTIAL_LABEL, marker)),
    );
    zones
}

pub fn load_secret_files(config: &ClassifierConfig) -> Vec<SensitivePath> {
    config
        .secret_files
        .iter()
        .map(|file| SensitivePath::exact(SECRET_LABEL, file))
        .collect()
}
