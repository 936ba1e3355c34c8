//! `rc pause`: suspend or resume a running container.

use clap::Args;
use rc_common::types::ContainerName;
use rc_runtime::engine::Engine;

/// Arguments for the `pause` command.
#[derive(Args, Debug)]
pub struct PauseArgs {
    /// Container name.
    #[arg(short, long, value_parser = super::parse_name)]
    pub name: ContainerName,

    /// Resume a paused container instead.
    #[arg(long)]
    pub resume: bool,
}

/// Executes the `pause` command.
///
/// # Errors
///
/// Returns an error if the container is not running or cannot be signalled.
pub fn execute(args: PauseArgs, engine: &Engine) -> anyhow::Result<()> {
    let message = engine
        .pause(&args.name, args.resume)
        .map_err(|e| super::failed("pause", &e))?;
    tracing::info!(name = %args.name, %message, "pause");
    Ok(())
}
