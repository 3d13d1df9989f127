use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::GateError;
use crate::paths::default_socket_path;

pub const CONFIG_ENV: &str = "QUORUMGATE_CONFIG";
pub const SOCKET_ENV: &str = "QUORUMGATE_SOCKET";
pub const RPC_ENDPOINT_ENV: &str = "QUORUMGATE_RPC_ENDPOINT";
pub const BACKEND_ENV: &str = "QUORUMGATE_BACKEND";
pub const TIMEOUT_ENV: &str = "QUORUMGATE_TIMEOUT_MS";
pub const LOG_ENV: &str = "QUORUMGATE_LOG";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub gate: GateConfig,
    pub transport: TransportConfig,
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    pub enabled: bool,
    pub unresolved_descriptor: UnresolvedDescriptorPolicy,
}

/// What to do with a read/write whose descriptor cannot be mapped to a path.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UnresolvedDescriptorPolicy {
    Passthrough,
    Deny,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Socket,
    Rpc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    pub backend: Backend,
    pub socket_path: PathBuf,
    pub approval_token: String,
    pub rpc_endpoint: String,
    pub rpc_method: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivePrefixConfig {
    pub label: String,
    pub prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub sensitive_prefixes: Vec<SensitivePrefixConfig>,
    pub credential_markers: Vec<String>,
    pub secret_files: Vec<String>,
    pub mmap_threshold_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "warn,quorumgate::audit=info,quorumgate::summary=info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_path: PathBuf,
}

impl TransportConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Config {
    pub fn default_config() -> Self {
        let prefix = |label: &str, prefix: &str| SensitivePrefixConfig {
            label: label.to_string(),
            prefix: prefix.to_string(),
        };
        Self {
            gate: GateConfig {
                enabled: true,
                unresolved_descriptor: UnresolvedDescriptorPolicy::Passthrough,
            },
            transport: TransportConfig {
                backend: Backend::Socket,
                socket_path: default_socket_path(),
                approval_token: "APPROVE".to_string(),
                rpc_endpoint: "http://127.0.0.1:9944".to_string(),
                rpc_method: "quorumgate_submitOperation".to_string(),
                timeout_ms: 10_000,
            },
            classifier: ClassifierConfig {
                sensitive_prefixes: vec![
                    prefix("System configuration", "/etc/"),
                    prefix("Boot", "/boot/"),
                    prefix("System binaries", "/bin/"),
                    prefix("System binaries", "/sbin/"),
                    prefix("System binaries", "/usr/"),
                    prefix("Libraries", "/lib/"),
                    prefix("Libraries", "/lib64/"),
                    prefix("Root home", "/root/"),
                ],
                credential_markers: vec!["/.ssh/".to_string(), "/.gnupg/".to_string()],
                secret_files: vec![
                    "/etc/shadow".to_string(),
                    "/etc/gshadow".to_string(),
                    "/etc/passwd".to_string(),
                    "/etc/sudoers".to_string(),
                ],
                mmap_threshold_bytes: 1024 * 1024,
            },
            logging: LoggingConfig::default(),
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("parse config TOML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        let output = toml::to_string_pretty(self).context("render config TOML")?;
        Ok(output)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("read config at {}", path.display()))?;
        Self::from_toml_str(&contents)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create config dir {}", parent.display()))?;
        }
        let contents = self.to_toml_string()?;
        fs::write(path, contents).with_context(|| format!("write config at {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), GateError> {
        if self.transport.timeout_ms == 0 {
            return Err(GateError::InvalidConfig("transport.timeout_ms must be > 0".into()));
        }
        if self.transport.approval_token.is_empty() {
            return Err(GateError::InvalidConfig("transport.approval_token is empty".into()));
        }
        if self.classifier.sensitive_prefixes.iter().any(|rule| rule.prefix.is_empty()) {
            return Err(GateError::InvalidConfig("empty sensitive prefix".into()));
        }
        Ok(())
    }

    /// Applies `QUORUMGATE_*` overrides on top of the loaded file.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(value) = lookup(SOCKET_ENV) {
            self.transport.socket_path = PathBuf::from(value);
        }
        if let Some(value) = lookup(RPC_ENDPOINT_ENV) {
            self.transport.rpc_endpoint = value;
        }
        if let Some(value) = lookup(BACKEND_ENV) {
            self.transport.backend = match value.to_lowercase().as_str() {
                "socket" => Backend::Socket,
                "rpc" => Backend::Rpc,
                other => anyhow::bail!("unknown backend in {BACKEND_ENV}: {other}"),
            };
        }
        if let Some(value) = lookup(TIMEOUT_ENV) {
            self.transport.timeout_ms = value
                .parse()
                .with_context(|| format!("parse {TIMEOUT_ENV}={value}"))?;
        }
        if let Some(value) = lookup(LOG_ENV) {
            self.logging.filter = value;
        }
        self.validate()?;
        Ok(())
    }

    /// Loads the effective config: explicit path, then `QUORUMGATE_CONFIG`,
    /// then the per-user config file, then the built-in table.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => std::env::var(CONFIG_ENV)
                .ok()
                .map(PathBuf::from)
                .or_else(|| ConfigPaths::resolve().ok().map(|paths| paths.config_path)),
        };
        let mut config = match path {
            Some(path) if path.exists() => Self::load(&path)?,
            _ => Self::default_config(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }
}

impl ConfigPaths {
    pub fn resolve() -> Result<Self> {
        let project_dirs = ProjectDirs::from("io", "quorumgate", "quorumgate")
            .ok_or_else(|| anyhow::anyhow!("unable to determine project directories"))?;
        Ok(Self {
            config_path: project_dirs.config_dir().join("config.toml"),
        })
    }
}
