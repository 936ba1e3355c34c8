//! `rc start`: run the init process of a created container.

use clap::Args;
use rc_common::types::ContainerName;
use rc_runtime::engine::Engine;

/// Arguments for the `start` command.
#[derive(Args, Debug)]
pub struct StartArgs {
    /// Container name.
    #[arg(short, long, value_parser = super::parse_name)]
    pub name: ContainerName,
}

/// Executes the `start` command.
///
/// # Errors
///
/// Returns an error if the container does not exist, is already running,
/// or its init command cannot be executed.
pub fn execute(args: StartArgs, engine: &Engine) -> anyhow::Result<()> {
    let message = engine
        .start(&args.name)
        .map_err(|e| super::failed("start", &e))?;
    tracing::info!(name = %args.name, %message, "start");
    Ok(())
}
