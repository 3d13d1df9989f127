use std::path::PathBuf;

use anyhow::Result;

use quorumgate_core::config::Config;

/// Prints the config the gate would run with, env overrides included.
pub fn print_effective(config_path: Option<PathBuf>) -> Result<()> {
    let config = Config::resolve(config_path.as_deref())?;
    let output = config.to_toml_string()?;
    println!("{}", output);
    Ok(())
}
