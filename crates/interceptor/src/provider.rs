use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};

use quorumgate_core::config::CONFIG_ENV;
use reporting::GateSummary;

/// Name of the shared object built by the `quorumgate-preload` crate.
pub const PRELOAD_LIBRARY: &str = "libquorumgate_preload.so";

const LD_PRELOAD: &str = "LD_PRELOAD";

/// How a provider captures calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mechanism {
    /// Symbol interposition through the dynamic linker.
    DynamicLinker,
    /// Kernel-level syscall filtering with a userspace supervisor.
    KernelFilter,
}

#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Config file the supervised process should load.
    pub config_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ProviderRun {
    pub exit_code: Option<i32>,
    /// Present when the provider ran the gate in-process and can report it.
    pub summary: Option<GateSummary>,
}

/// Launches a command with every monitored operation routed through a gate.
pub trait InterceptionProvider {
    fn name(&self) -> &'static str;

    fn mechanism(&self) -> Mechanism;

    fn launch(&self, request: &LaunchRequest) -> Result<ProviderRun>;
}

/// Runs the command with the preload library injected; the gate then lives
/// inside the child and prints its own summary at exit.
#[derive(Debug, Clone)]
pub struct PreloadProvider {
    library: PathBuf,
}

impl PreloadProvider {
    pub fn new(library: impl Into<PathBuf>) -> Self {
        Self {
            library: library.into(),
        }
    }

    /// Uses `explicit` when given, else looks for the library next to the
    /// running executable.
    pub fn locate(explicit: Option<&Path>) -> Result<Self> {
        let library = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let exe = std::env::current_exe().context("locate current executable")?;
                exe.parent()
                    .map(|dir| dir.join(PRELOAD_LIBRARY))
                    .with_context(|| format!("no parent directory for {}", exe.display()))?
            }
        };
        if !library.is_file() {
            bail!("preload library not found at {}", library.display());
        }
        let library = library
            .canonicalize()
            .with_context(|| format!("resolve {}", library.display()))?;
        Ok(Self::new(library))
    }

    pub fn library(&self) -> &Path {
        &self.library
    }

    pub fn command(&self, request: &LaunchRequest) -> Command {
        let mut command = Command::new(&request.program);
        command.args(&request.args);
        command.env(LD_PRELOAD, preload_value(&self.library, std::env::var_os(LD_PRELOAD)));
        if let Some(config_path) = &request.config_path {
            command.env(CONFIG_ENV, config_path);
        }
        command
    }
}

impl InterceptionProvider for PreloadProvider {
    fn name(&self) -> &'static str {
        "preload"
    }

    fn mechanism(&self) -> Mechanism {
        Mechanism::DynamicLinker
    }

    fn launch(&self, request: &LaunchRequest) -> Result<ProviderRun> {
        tracing::info!(
            program = %request.program.display(),
            library = %self.library.display(),
            "launching with preload gate"
        );
        let status = self
            .command(request)
            .status()
            .with_context(|| format!("launch {}", request.program.display()))?;
        Ok(ProviderRun {
            exit_code: status.code(),
            summary: None,
        })
    }
}

/// Puts the gate first so its hooks win over any other preloaded library.
fn preload_value(library: &Path, existing: Option<OsString>) -> OsString {
    let mut value = library.as_os_str().to_os_string();
    if let Some(existing) = existing.filter(|existing| !existing.is_empty()) {
        value.push(":");
        value.push(existing);
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preload_is_prepended() {
        let library = Path::new("/opt/quorumgate/libquorumgate_preload.so");
        assert_eq!(preload_value(library, None), OsString::from(library));
        assert_eq!(
            preload_value(library, Some(OsString::from("/usr/lib/libother.so"))),
            OsString::from("/opt/quorumgate/libquorumgate_preload.so:/usr/lib/libother.so")
        );
    }

    #[test]
    fn command_exports_config_path() {
        let provider = PreloadProvider::new("/opt/quorumgate/libquorumgate_preload.so");
        let request = LaunchRequest {
            program: PathBuf::from("/bin/true"),
            args: vec!["--flag".to_string()],
            config_path: Some(PathBuf::from("/etc/quorumgate/config.toml")),
        };
        let command = provider.command(&request);
        let envs: Vec<_> = command.get_envs().collect();
        let expected = Path::new("/etc/quorumgate/config.toml").as_os_str();
        assert!(envs
            .iter()
            .any(|(key, value)| *key == CONFIG_ENV && *value == Some(expected)));
        assert_eq!(command.get_args().collect::<Vec<_>>(), vec!["--flag"]);
        assert_eq!(provider.mechanism(), Mechanism::DynamicLinker);
    }

    #[test]
    fn locate_rejects_missing_library() {
        assert!(PreloadProvider::locate(Some(Path::new("/nonexistent/lib.so"))).is_err());
    }
}
