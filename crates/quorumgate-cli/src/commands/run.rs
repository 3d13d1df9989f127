use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::ValueEnum;

use interceptor::{InterceptionProvider, LaunchRequest, PreloadProvider};
use monitor::SeccompProvider;
use quorumgate_core::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Provider {
    Preload,
    Seccomp,
}

pub struct RunInputs {
    pub config_path: Option<PathBuf>,
    pub provider: Provider,
    pub library: Option<PathBuf>,
    pub json: bool,
    pub program: PathBuf,
    pub args: Vec<String>,
}

/// Returns the supervised process's exit code.
pub fn execute(inputs: RunInputs) -> Result<Option<i32>> {
    let config = Config::resolve(inputs.config_path.as_deref())?;
    interceptor::logging::init_tracing(&config.logging);

    // The child may run from another directory; hand it an absolute path.
    let config_path = match &inputs.config_path {
        Some(path) if path.exists() => Some(
            std::fs::canonicalize(path)
                .with_context(|| format!("resolve config path {}", path.display()))?,
        ),
        _ => None,
    };
    let request = LaunchRequest {
        program: inputs.program,
        args: inputs.args,
        config_path,
    };

    let provider: Box<dyn InterceptionProvider> = match inputs.provider {
        Provider::Preload => Box::new(PreloadProvider::locate(inputs.library.as_deref())?),
        Provider::Seccomp => Box::new(SeccompProvider::new(config)),
    };
    tracing::debug!(
        provider = provider.name(),
        mechanism = ?provider.mechanism(),
        "provider selected"
    );

    let run = provider.launch(&request)?;
    if let Some(summary) = run.summary {
        if inputs.json {
            println!("{}", reporting::json::render_json(&summary));
        } else {
            println!("{}", summary.human_summary());
        }
    }
    Ok(run.exit_code)
}
