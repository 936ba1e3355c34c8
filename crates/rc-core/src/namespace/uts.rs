//! UTS namespace isolation.
//!
//! Gives the container its own hostname, decoupled from the host's.

use rc_common::error::{RcError, Result};

/// Sets the hostname inside the caller's UTS namespace.
///
/// # Errors
///
/// Returns an error if `sethostname(2)` fails.
#[cfg(target_os = "linux")]
pub fn set_hostname(hostname: &str) -> Result<()> {
    nix::unistd::sethostname(hostname).map_err(|e| RcError::Hostname {
        hostname: hostname.to_owned(),
        source: e.into(),
    })?;
    tracing::debug!(hostname, "container hostname set");
    Ok(())
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error: UTS namespaces require Linux.
#[cfg(not(target_os = "linux"))]
pub fn set_hostname(_hostname: &str) -> Result<()> {
    Err(RcError::Config {
        message: "Linux required for native container operations".into(),
    })
}

/// Checks that a hostname is acceptable to `sethostname(2)`.
///
/// # Errors
///
/// Returns an error if the name is empty, longer than 64 bytes, or
/// contains characters outside letters, digits, `-` and `.`.
pub fn validate_hostname(hostname: &str) -> Result<()> {
    let valid = !hostname.is_empty()
        && hostname.len() <= 64
        && hostname
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'.');
    if valid {
        Ok(())
    } else {
        Err(RcError::Config {
            message: format!("invalid hostname: {hostname:?}"),
        })
    }
}
