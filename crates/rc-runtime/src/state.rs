//! Container state record.
//!
//! One small JSON file per container lets later controller invocations
//! find the container's init process without a daemon.

use std::path::Path;

use rc_common::error::{RcError, Result};
use rc_common::types::{CommandLine, ContainerName};
use serde::{Deserialize, Serialize};

/// Persistent record of a bootstrapped container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEntry {
    /// Container name.
    pub name: ContainerName,
    /// Host PID of the supervisor, later of the container command.
    pub pid: i32,
    /// Start time of `pid` in clock ticks since boot; a live process with
    /// the same PID but another start time is not this container.
    pub start_time: u64,
    /// Entry command registered by CREATE.
    pub command: CommandLine,
    /// Hostname set inside the container.
    pub hostname: String,
    /// RFC 3339 timestamp of creation.
    pub created_at: String,
}

impl StateEntry {
    /// Record for a container created now.
    #[must_use]
    pub fn new(
        name: ContainerName,
        pid: i32,
        start_time: u64,
        command: CommandLine,
        hostname: String,
    ) -> Self {
        Self {
            name,
            pid,
            start_time,
            command,
            hostname,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Loads a state record; `Ok(None)` if the file does not exist.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_state(path: &Path) -> Result<Option<StateEntry>> {
    tracing::debug!(path = %path.display(), "loading state record");
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(RcError::Io {
                path: path.to_path_buf(),
                source: e,
            });
        }
    };
    Ok(Some(serde_json::from_str(&content)?))
}

/// Persists a state record atomically (write to a temp file, then rename).
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn save_state(path: &Path, entry: &StateEntry) -> Result<()> {
    tracing::debug!(path = %path.display(), pid = entry.pid, "saving state record");
    let json = serde_json::to_string_pretty(entry)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(|e| RcError::Io {
        path: tmp.clone(),
        source: e,
    })?;
    std::fs::rename(&tmp, path).map_err(|e| RcError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}
