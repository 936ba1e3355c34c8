//! `rc stop`: stop a container.

use clap::Args;
use rc_common::types::ContainerName;
use rc_runtime::engine::Engine;

/// Arguments for the `stop` command.
#[derive(Args, Debug)]
pub struct StopArgs {
    /// Container name.
    #[arg(short, long, value_parser = super::parse_name)]
    pub name: ContainerName,
}

/// Executes the `stop` command.
///
/// # Errors
///
/// Returns an error if the container does not exist or cannot be signalled.
pub fn execute(args: StopArgs, engine: &Engine) -> anyhow::Result<()> {
    let message = engine
        .stop(&args.name)
        .map_err(|e| super::failed("stop", &e))?;
    tracing::info!(name = %args.name, %message, "stop");
    Ok(())
}
