//! Namespace joining for executing commands in running containers.

use rc_common::error::{RcError, Result};
use rc_common::types::{CommandLine, ContainerName};
use rc_core::bootstrap::ExitReport;

/// Namespaces joined by an exec, as `nsenter` flags. The user namespace
/// comes first so the remaining joins happen with the container's
/// capabilities.
const NAMESPACE_FLAGS: [&str; 5] = ["--user", "--mount", "--uts", "--net", "--pid"];

/// Builds the `nsenter` argument list for `command` inside `pid`'s namespaces.
#[must_use]
pub fn nsenter_args(pid: i32, command: &CommandLine) -> Vec<String> {
    let mut args = vec!["--target".to_owned(), pid.to_string()];
    args.extend(NAMESPACE_FLAGS.iter().map(|flag| (*flag).to_owned()));
    // Keep the caller's IDs: they are the ones mapped to root inside.
    args.push("--preserve-credentials".to_owned());
    args.push("--".to_owned());
    args.extend(command.args().iter().cloned());
    args
}

/// Joins the namespaces of a running container and executes a command.
///
/// The command shares the caller's standard streams; its exit status is
/// returned once it finishes.
///
/// # Errors
///
/// Returns an error if the command is empty, `nsenter` is not installed,
/// or it cannot be spawned.
#[cfg(target_os = "linux")]
pub fn exec_in_container(
    name: &ContainerName,
    pid: i32,
    command: &CommandLine,
) -> Result<ExitReport> {
    use std::os::unix::process::ExitStatusExt;

    tracing::info!(name = %name, pid, cmd = %command, "exec into container");

    if command.is_empty() {
        return Err(RcError::Config {
            message: "exec command is empty".into(),
        });
    }

    let nsenter = which::which("nsenter").map_err(|_| RcError::NotFound {
        kind: "program",
        id: "nsenter".into(),
    })?;

    let status = std::process::Command::new(&nsenter)
        .args(nsenter_args(pid, command))
        .status()
        .map_err(|e| RcError::Io {
            path: nsenter,
            source: e,
        })?;

    Ok(match (status.code(), status.signal()) {
        (Some(code), _) => ExitReport::Exited(code),
        (None, Some(signal)) => ExitReport::Signaled(signal),
        (None, None) => ExitReport::Exited(-1),
    })
}

/// Joins the namespaces of a running container and executes a command.
///
/// # Errors
///
/// Always returns an error on non-Linux platforms.
#[cfg(not(target_os = "linux"))]
pub fn exec_in_container(
    _name: &ContainerName,
    _pid: i32,
    _command: &CommandLine,
) -> Result<ExitReport> {
    Err(RcError::Config {
        message: "exec requires Linux".into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nsenter_args_target_pid_and_end_options() {
        let args = nsenter_args(
            4242,
            &CommandLine::new(vec!["ps".into(), "aux".into()]),
        );
        assert_eq!(&args[..2], ["--target", "4242"]);
        assert_eq!(args[2], "--user");
        let separator = args.iter().position(|a| a == "--").expect("separator");
        assert_eq!(&args[separator + 1..], ["ps", "aux"]);
        assert!(args.contains(&"--pid".to_owned()));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn empty_command_is_rejected() {
        let name = ContainerName::new("c1").expect("name");
        let err = exec_in_container(&name, 1, &CommandLine::default()).expect_err("empty");
        assert!(matches!(err, RcError::Config { .. }));
    }
}
