//! CLI command definitions and dispatch.

pub mod create;
pub mod exec;
pub mod pause;
pub mod start;
pub mod stop;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rc_common::config::RuntimeConfig;
use rc_common::constants::DEFAULT_HOSTNAME;
use rc_common::error::RcError;
use rc_common::types::ContainerName;
use rc_runtime::engine::Engine;

/// rc: a minimal container runtime.
#[derive(Parser, Debug)]
#[command(name = "rc", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Directory holding the runtime state of every container.
    #[arg(long, global = true, env = "RC_ROOT")]
    pub root: Option<PathBuf>,

    /// Hostname given to new containers.
    #[arg(long, global = true, env = "RC_HOSTNAME", default_value = DEFAULT_HOSTNAME)]
    pub hostname: String,

    /// Command channel timeout in milliseconds.
    #[arg(long, global = true)]
    pub timeout: Option<u64>,
}

impl Cli {
    /// Runtime configuration with the global flags applied.
    fn config(&self) -> RuntimeConfig {
        let mut config = RuntimeConfig::default();
        if let Some(root) = &self.root {
            config.root_dir.clone_from(root);
        }
        config.hostname.clone_from(&self.hostname);
        if let Some(timeout) = self.timeout {
            config.channel_timeout_ms = timeout;
        }
        config
    }
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a container and wait for its init process to exit.
    Create(create::CreateArgs),
    /// Start the init process of a created container.
    Start(start::StartArgs),
    /// Run a command inside a running container.
    Exec(exec::ExecArgs),
    /// Stop a container.
    Stop(stop::StopArgs),
    /// Suspend or resume a running container.
    Pause(pause::PauseArgs),
}

/// Parses and validates a `-n/--name` value.
pub(crate) fn parse_name(name: &str) -> Result<ContainerName, RcError> {
    ContainerName::new(name)
}

/// Prefixes an engine error with the operation that failed.
pub(crate) fn failed(operation: &str, error: &RcError) -> anyhow::Error {
    anyhow::anyhow!("{operation}: {error}")
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let engine = Engine::new(cli.config());
    match cli.command {
        Command::Create(args) => create::execute(args, &engine),
        Command::Start(args) => start::execute(args, &engine),
        Command::Exec(args) => exec::execute(args, &engine),
        Command::Stop(args) => stop::execute(args, &engine),
        Command::Pause(args) => pause::execute(args, &engine),
    }
}
