//! `rc exec`: execute a command inside a running container.

use clap::Args;
use rc_common::types::{CommandLine, ContainerName};
use rc_runtime::engine::Engine;

/// Arguments for the `exec` command.
#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Container name.
    #[arg(short, long, value_parser = super::parse_name)]
    pub name: ContainerName,

    /// Command to execute.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    pub command: Vec<String>,
}

/// Executes the `exec` command.
///
/// Joins the target container's namespaces and runs the specified
/// command with this process's standard streams.
///
/// # Errors
///
/// Returns an error if the container is not running or namespace joining fails.
pub fn execute(args: ExecArgs, engine: &Engine) -> anyhow::Result<()> {
    let report = engine
        .exec(&args.name, &CommandLine::new(args.command))
        .map_err(|e| super::failed("exec", &e))?;
    tracing::debug!(name = %args.name, ?report, "exec finished");
    std::process::exit(report.code());
}
