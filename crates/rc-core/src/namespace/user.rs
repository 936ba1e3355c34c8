//! User namespace isolation.
//!
//! Maps container root to the invoking user's IDs, so containers run
//! without host privileges.

use rc_common::error::{RcError, Result};

/// One-line ID mapping written to `uid_map` and `gid_map`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdMapping {
    /// First ID inside the namespace.
    pub container_id: u32,
    /// Host UID that `container_id` maps to.
    pub host_uid: u32,
    /// Host GID that `container_id` maps to.
    pub host_gid: u32,
    /// Number of consecutive IDs mapped.
    pub range: u32,
}

impl IdMapping {
    /// Maps container root to the caller's effective UID and GID.
    #[cfg(target_os = "linux")]
    #[must_use]
    pub fn current_user() -> Self {
        Self {
            container_id: 0,
            host_uid: nix::unistd::geteuid().as_raw(),
            host_gid: nix::unistd::getegid().as_raw(),
            range: 1,
        }
    }

    /// Contents of `/proc/<pid>/uid_map`.
    #[must_use]
    pub fn uid_line(&self) -> String {
        format!("{} {} {}\n", self.container_id, self.host_uid, self.range)
    }

    /// Contents of `/proc/<pid>/gid_map`.
    #[must_use]
    pub fn gid_line(&self) -> String {
        format!("{} {} {}\n", self.container_id, self.host_gid, self.range)
    }
}

/// Writes the UID/GID mapping for the user namespace of `pid`.
///
/// `setgroups` is denied first, which the kernel requires before an
/// unprivileged process may write `gid_map`.
///
/// # Errors
///
/// Returns an error if writing to `/proc/[pid]/setgroups`,
/// `/proc/[pid]/uid_map`, or `/proc/[pid]/gid_map` fails.
#[cfg(target_os = "linux")]
pub fn write_id_maps(pid: i32, mapping: &IdMapping) -> Result<()> {
    use std::fs;
    use std::path::PathBuf;

    let proc_dir = PathBuf::from(format!("/proc/{pid}"));

    let setgroups_path = proc_dir.join("setgroups");
    if setgroups_path.exists() {
        fs::write(&setgroups_path, "deny").map_err(|e| RcError::Io {
            path: setgroups_path,
            source: e,
        })?;
    }

    let uid_map_path = proc_dir.join("uid_map");
    fs::write(&uid_map_path, mapping.uid_line()).map_err(|e| RcError::Io {
        path: uid_map_path,
        source: e,
    })?;

    let gid_map_path = proc_dir.join("gid_map");
    fs::write(&gid_map_path, mapping.gid_line()).map_err(|e| RcError::Io {
        path: gid_map_path,
        source: e,
    })?;

    tracing::debug!(pid, ?mapping, "wrote UID/GID map");
    Ok(())
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error: UID/GID mapping requires Linux.
#[cfg(not(target_os = "linux"))]
pub fn write_id_maps(_pid: i32, _mapping: &IdMapping) -> Result<()> {
    Err(RcError::Config {
        message: "Linux required for native container operations".into(),
    })
}
