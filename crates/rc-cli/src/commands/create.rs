//! `rc create`: create a container and wait for its init process.

use clap::Args;
use rc_common::types::{CommandLine, ContainerName};
use rc_runtime::engine::Engine;

use crate::output;

/// Arguments for the `create` command.
#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Container name.
    #[arg(short, long, value_parser = super::parse_name)]
    pub name: ContainerName,

    /// Init command, run when the container is started.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    pub command: Vec<String>,
}

/// Executes the `create` command.
///
/// Bootstraps the container and stays attached to it: the container's
/// output appears here and its exit status becomes this process's status.
///
/// # Errors
///
/// Returns an error if the container already exists or cannot be created.
pub fn execute(args: CreateArgs, engine: &Engine) -> anyhow::Result<()> {
    tracing::info!(name = %args.name, "creating container");
    let report = engine
        .create(&args.name, &CommandLine::new(args.command))
        .map_err(|e| super::failed("create", &e))?;

    output::status(&output::describe_exit("init process", report));
    std::process::exit(report.code());
}
