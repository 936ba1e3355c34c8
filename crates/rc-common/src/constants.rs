//! System-wide constants and default paths.

use std::path::PathBuf;
use std::sync::OnceLock;

/// Application name used in diagnostics and runtime paths.
pub const APP_NAME: &str = "rc";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "rc";

/// Hostname given to every container unless overridden.
pub const DEFAULT_HOSTNAME: &str = "init";

/// Size of the stack reserved for the isolated entry point (1 MiB).
pub const DEFAULT_STACK_SIZE: usize = 1024 * 1024;

/// Bounded wait on command channel reads, in milliseconds.
pub const DEFAULT_CHANNEL_TIMEOUT_MS: u64 = 10_000;

/// Grace period between SIGTERM and SIGKILL on stop, in milliseconds.
pub const DEFAULT_STOP_GRACE_MS: u64 = 2_000;

/// File name of the supervisor's listening socket inside a container directory.
pub const CONTROL_SOCKET: &str = "control.sock";

/// File name of the container state record inside a container directory.
pub const STATE_FILE: &str = "state.json";

/// Mount point of the container's process-information filesystem.
pub const PROC_MOUNT_POINT: &str = "/proc";

/// Longest accepted container name.
pub const MAX_NAME_LEN: usize = 64;

/// Upper bound on a request payload carried over the command channel.
pub const MAX_REQUEST_PAYLOAD: u32 = 1024 * 1024;

/// Upper bound on a response message carried over the command channel.
pub const MAX_RESPONSE_MESSAGE: u32 = 64 * 1024;

/// Exit status of the supervisor when namespace-local setup fails.
pub const EXIT_SETUP_FAILURE: i32 = 1;

/// Exit status of the supervisor when the container command cannot be executed.
pub const EXIT_EXEC_FAILURE: i32 = 127;

/// Returns the runtime root, preferring `$XDG_RUNTIME_DIR/rc` and falling
/// back to a per-user directory under the system temp dir.
fn resolve_runtime_root() -> PathBuf {
    if let Some(dir) = std::env::var_os("XDG_RUNTIME_DIR").filter(|d| !d.is_empty()) {
        return PathBuf::from(dir).join(APP_NAME);
    }
    let uid = nix::unistd::getuid();
    std::env::temp_dir().join(format!("{APP_NAME}-{uid}"))
}

static RUNTIME_ROOT: OnceLock<PathBuf> = OnceLock::new();

/// Returns the resolved runtime root for this session.
pub fn runtime_root() -> &'static PathBuf {
    RUNTIME_ROOT.get_or_init(resolve_runtime_root)
}
