//! Mount utilities for container filesystem setup.
//!
//! The mount namespace starts as a copy of the parent's table, so the
//! inherited `/proc` still describes the host PID namespace until a fresh
//! instance is mounted over it.

use std::path::Path;

use rc_common::error::{RcError, Result};

/// Marks every mount in the namespace recursively private.
///
/// Mounts made afterwards stay local to the container.
///
/// # Errors
///
/// Returns an error if the `mount(2)` syscall fails.
#[cfg(target_os = "linux")]
pub fn make_mounts_private() -> Result<()> {
    use nix::mount::{MsFlags, mount};

    mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_REC | MsFlags::MS_PRIVATE,
        None::<&str>,
    )
    .map_err(|e| RcError::Mount {
        target: "/".into(),
        source: e.into(),
    })?;
    tracing::debug!("mount propagation set to private");
    Ok(())
}

/// Mounts a fresh process-information filesystem at `target`.
///
/// # Errors
///
/// Returns an error if the `mount(2)` syscall fails.
#[cfg(target_os = "linux")]
pub fn mount_proc(target: &Path) -> Result<()> {
    use nix::mount::{MsFlags, mount};

    mount(
        Some("proc"),
        target,
        Some("proc"),
        MsFlags::MS_NOSUID | MsFlags::MS_NODEV | MsFlags::MS_NOEXEC,
        None::<&str>,
    )
    .map_err(|e| RcError::Mount {
        target: target.to_path_buf(),
        source: e.into(),
    })?;
    tracing::debug!(target = %target.display(), "proc mounted");
    Ok(())
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error: mount namespaces require Linux.
#[cfg(not(target_os = "linux"))]
pub fn make_mounts_private() -> Result<()> {
    Err(RcError::Config {
        message: "Linux required for native container operations".into(),
    })
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error: mount namespaces require Linux.
#[cfg(not(target_os = "linux"))]
pub fn mount_proc(_target: &Path) -> Result<()> {
    Err(RcError::Config {
        message: "Linux required for native container operations".into(),
    })
}
