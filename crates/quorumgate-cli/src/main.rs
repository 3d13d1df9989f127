use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use quorumgate_core::OperationKind;

mod commands;

#[derive(Parser, Debug)]
#[command(
    name = "quorumgate",
    version,
    about = "Gate sensitive operations behind an external consensus verdict"
)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write the default configuration file
    Init {
        #[arg(long)]
        path: Option<PathBuf>,
        #[arg(long)]
        force: bool,
    },
    Config {
        #[arg(long)]
        print: bool,
    },
    /// Show whether an operation would need consensus, without asking
    Classify {
        operation: OperationKind,
        path: Option<PathBuf>,
        #[arg(long)]
        flags: Option<i64>,
        #[arg(long)]
        size: Option<u64>,
        #[arg(long)]
        json: bool,
    },
    /// Send one consensus request to the configured backend
    Ask {
        operation: OperationKind,
        path: PathBuf,
        #[arg(long)]
        flags: Option<i64>,
    },
    /// Run a command with its operations gated
    Run {
        #[arg(long, value_enum, default_value_t = commands::run::Provider::Preload)]
        provider: commands::run::Provider,
        #[arg(long)]
        library: Option<PathBuf>,
        #[arg(long)]
        json: bool,
        program: PathBuf,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { path, force } => init_config(path, force),
        Commands::Config { print } => {
            if print {
                commands::config::print_effective(cli.config)
            } else {
                Ok(())
            }
        }
        Commands::Classify {
            operation,
            path,
            flags,
            size,
            json,
        } => commands::classify::execute(commands::classify::ClassifyInputs {
            config_path: cli.config,
            operation,
            path,
            flags,
            size,
            json,
        }),
        Commands::Ask {
            operation,
            path,
            flags,
        } => commands::ask::execute(cli.config, operation, path, flags),
        Commands::Run {
            provider,
            library,
            json,
            program,
            args,
        } => {
            let exit_code = commands::run::execute(commands::run::RunInputs {
                config_path: cli.config,
                provider,
                library,
                json,
                program,
                args,
            })?;
            match exit_code {
                Some(0) => Ok(()),
                Some(code) => std::process::exit(code),
                None => Err(anyhow::anyhow!("supervised process was killed by a signal")),
            }
        }
    }
}

fn init_config(path: Option<PathBuf>, force: bool) -> Result<()> {
    let paths = quorumgate_core::config::ConfigPaths::resolve()?;
    let config_path = path.unwrap_or(paths.config_path);
    if config_path.exists() && !force {
        return Err(anyhow::anyhow!(
            "Config already exists at {} (use --force to overwrite)",
            config_path.display()
        ));
    }
    let config = quorumgate_core::config::Config::default_config();
    config.save(&config_path)?;
    println!("Config written to {}", config_path.display());
    Ok(())
}
