mod command_cmd;
mod config;
mod parse_cmd;
mod render;
mod run_cmd;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};

use agentline_core::AuthMode;

use config::{CliOverrides, ResolvedConfig};
use render::OutputFormat;

#[derive(Parser)]
#[command(
    name = "agentline",
    about = "Drive coding-agent CLIs and normalize their streaming output"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Backend selection shared by the subcommands that talk to a backend.
#[derive(Args, Debug, Default)]
struct BackendArgs {
    /// Backend to use: claude or codex (overrides AGENTLINE_BACKEND)
    #[arg(long)]
    backend: Option<String>,
    /// Auth mode: subscription or api_key (overrides AGENTLINE_AUTH_MODE)
    #[arg(long)]
    auth: Option<AuthMode>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write an agentline config file with default settings
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// List available backends and their binaries
    Backends,
    /// Print the command and environment changes a run would use
    Command {
        #[command(flatten)]
        backend: BackendArgs,
        /// Continue this session
        #[arg(long)]
        resume: Option<String>,
        /// Prompt to send
        prompt: String,
    },
    /// Run a backend on a prompt and stream its events
    Run {
        #[command(flatten)]
        backend: BackendArgs,
        /// Deadline in seconds (overrides AGENTLINE_TIMEOUT)
        #[arg(long)]
        timeout: Option<u64>,
        /// Continue this session
        #[arg(long)]
        resume: Option<String>,
        /// Working directory for the backend
        #[arg(long)]
        cwd: Option<PathBuf>,
        /// Print events as JSON lines
        #[arg(long)]
        json: bool,
        /// Prompt to send
        prompt: String,
    },
    /// Decode a captured backend transcript read from stdin
    Parse {
        /// Backend whose output format to decode (overrides AGENTLINE_BACKEND)
        #[arg(long)]
        backend: Option<String>,
        /// Deadline in seconds (overrides AGENTLINE_TIMEOUT)
        #[arg(long)]
        timeout: Option<u64>,
        /// Print events as JSON lines
        #[arg(long)]
        json: bool,
    },
}

/// Execute the `agentline init` command: write config file.
fn cmd_init(force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile::with_defaults();
    let path = config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  defaults.backend = {}", config::DEFAULT_BACKEND);
    println!("  defaults.auth_mode = {}", config::DEFAULT_AUTH_MODE);
    println!("  defaults.timeout_secs = {}", config::DEFAULT_TIMEOUT_SECS);
    Ok(())
}

/// Execute the `agentline backends` command.
fn cmd_backends(resolved: &ResolvedConfig) {
    let registry = resolved.registry();
    for name in registry.list() {
        let marker = if name == resolved.backend { "*" } else { " " };
        let binary = resolved.binary_for(name).unwrap_or("-");
        println!("{marker} {name:<8} {binary}");
    }
}

fn overrides(backend: BackendArgs, timeout_secs: Option<u64>) -> CliOverrides {
    CliOverrides {
        backend: backend.backend,
        auth_mode: backend.auth,
        timeout_secs,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Logs go to stderr; stdout carries events.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { force } => {
            cmd_init(force)?;
        }
        Commands::Backends => {
            let resolved = ResolvedConfig::load(&CliOverrides::default())?;
            cmd_backends(&resolved);
        }
        Commands::Command {
            backend,
            resume,
            prompt,
        } => {
            let resolved = ResolvedConfig::load(&overrides(backend, None))?;
            let backend = resolved.backend()?;
            command_cmd::run_command(backend.as_ref(), &prompt, resume.as_deref())?;
        }
        Commands::Run {
            backend,
            timeout,
            resume,
            cwd,
            json,
            prompt,
        } => {
            let resolved = ResolvedConfig::load(&overrides(backend, timeout))?;
            let backend = resolved.backend()?;
            let options = run_cmd::RunOptions {
                prompt,
                resume,
                cwd,
                timeout: resolved.timeout,
                format: OutputFormat::from_json_flag(json),
            };
            return run_cmd::run_run(backend.as_ref(), options).await;
        }
        Commands::Parse {
            backend,
            timeout,
            json,
        } => {
            let args = BackendArgs {
                backend,
                auth: None,
            };
            let resolved = ResolvedConfig::load(&overrides(args, timeout))?;
            let backend = resolved.backend()?;
            return parse_cmd::run_parse(
                backend.as_ref(),
                resolved.timeout,
                OutputFormat::from_json_flag(json),
            )
            .await;
        }
    }

    Ok(ExitCode::SUCCESS)
}
