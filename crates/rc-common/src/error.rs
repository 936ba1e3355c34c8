//! Unified error types for the rc workspace.
//!
//! Fatal conditions (bootstrap, mount, hostname, exec, wait) terminate the
//! process that hit them. Lifecycle rejections are recoverable: the
//! supervisor reports them over the command channel and keeps serving.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::Status;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum RcError {
    /// Namespace or process creation failed.
    #[error("failed to bootstrap container at {stage}: {source}")]
    Bootstrap {
        /// Bootstrap step that failed.
        stage: &'static str,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// Mounting a filesystem inside the container failed.
    #[error("failed to mount {target} in container: {source}")]
    Mount {
        /// Mount point.
        target: PathBuf,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// Setting the container hostname failed.
    #[error("failed to set hostname {hostname:?} in container: {source}")]
    Hostname {
        /// Requested hostname.
        hostname: String,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// CREATE was issued while an init process already exists.
    #[error("container init process already exists")]
    DuplicateInit,

    /// START, EXEC, STOP or PAUSE was issued before a successful CREATE.
    #[error("no init process exists to be started; first create one and then start it")]
    NoInitProcess,

    /// EXEC or PAUSE was issued before the container was started.
    #[error("container has not been started")]
    NotRunning,

    /// START was issued for a container that already replaced its supervisor.
    #[error("container is already running")]
    AlreadyRunning,

    /// Replacing the supervisor image with the container command failed.
    #[error("failed to start init process {command:?}: {reason}")]
    Exec {
        /// Program that could not be executed.
        command: String,
        /// OS error text.
        reason: String,
    },

    /// The command channel failed or carried a malformed message.
    #[error("command channel: {source}")]
    Channel {
        /// Underlying channel error.
        #[from]
        source: ChannelError,
    },

    /// The supervisor rejected a command for a reason without a dedicated variant.
    #[error("supervisor rejected command ({status}): {message}")]
    Rejected {
        /// Status reported on the wire.
        status: Status,
        /// Message reported on the wire.
        message: String,
    },

    /// Waiting for a container process failed.
    #[error("failed to wait for init process {pid}: {source}")]
    Wait {
        /// Host PID being waited on.
        pid: i32,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// Delivering a signal to a container process failed.
    #[error("failed to send {signal} to process {pid}: {source}")]
    Signal {
        /// Target PID (negative for a process group).
        pid: i32,
        /// Signal name.
        signal: &'static str,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration or argument value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid value.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl RcError {
    /// Wire status used when this error is reported back to a controller.
    #[must_use]
    pub const fn status(&self) -> Status {
        match self {
            Self::DuplicateInit => Status::DuplicateInit,
            Self::NoInitProcess => Status::NoInitProcess,
            Self::NotRunning => Status::NotRunning,
            Self::AlreadyRunning => Status::AlreadyRunning,
            Self::Exec { .. } => Status::ExecFailed,
            Self::Rejected { status, .. } => *status,
            _ => Status::BadRequest,
        }
    }

    /// Whether the supervisor can keep serving after this error.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::DuplicateInit
                | Self::NoInitProcess
                | Self::NotRunning
                | Self::AlreadyRunning
                | Self::Rejected { .. }
                | Self::Config { .. }
        ) || matches!(self, Self::Channel { source } if source.is_per_message())
    }
}

/// Failures of the command channel between controller and supervisor.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The peer closed the channel before sending anything.
    #[error("channel closed by peer")]
    Closed,

    /// The peer closed the channel in the middle of a frame.
    #[error("truncated message: expected {expected} bytes, received {received}")]
    Truncated {
        /// Bytes the frame announced.
        expected: usize,
        /// Bytes actually received.
        received: usize,
    },

    /// A frame announced more data than the protocol allows.
    #[error("message of {length} bytes exceeds limit of {limit}")]
    Oversized {
        /// Announced length.
        length: u32,
        /// Protocol limit.
        limit: u32,
    },

    /// The operation byte does not name a lifecycle operation.
    #[error("unknown operation code {0}")]
    UnknownOperation(u8),

    /// The status field does not name a known status.
    #[error("unknown status code {0}")]
    UnknownStatus(i32),

    /// The frame is internally inconsistent.
    #[error("malformed message: {reason}")]
    Malformed {
        /// What was wrong with the frame.
        reason: String,
    },

    /// No data arrived within the configured bound.
    #[error("timed out waiting for peer")]
    Timeout,

    /// The underlying socket or pipe failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ChannelError {
    /// Whether the error concerns one message only, leaving the channel usable.
    #[must_use]
    pub const fn is_per_message(&self) -> bool {
        matches!(
            self,
            Self::Truncated { .. }
                | Self::Oversized { .. }
                | Self::UnknownOperation(_)
                | Self::UnknownStatus(_)
                | Self::Malformed { .. }
                | Self::Timeout
        )
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, RcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_rejections_map_to_their_status() {
        assert_eq!(RcError::DuplicateInit.status(), Status::DuplicateInit);
        assert_eq!(RcError::NoInitProcess.status(), Status::NoInitProcess);
        assert_eq!(RcError::NotRunning.status(), Status::NotRunning);
        assert_eq!(RcError::AlreadyRunning.status(), Status::AlreadyRunning);
    }

    #[test]
    fn malformed_request_is_recoverable_but_closed_channel_is_not() {
        let malformed = RcError::from(ChannelError::UnknownOperation(9));
        assert!(malformed.is_recoverable());
        assert_eq!(malformed.status(), Status::BadRequest);

        assert!(!RcError::from(ChannelError::Closed).is_recoverable());
    }

    #[test]
    fn exec_error_names_command_and_reason() {
        let err = RcError::Exec {
            command: "/no/such".into(),
            reason: "ENOENT: No such file or directory".into(),
        };
        let text = err.to_string();
        assert!(text.contains("/no/such"));
        assert!(text.contains("No such file"));
        assert_eq!(err.status(), Status::ExecFailed);
    }

    #[test]
    fn bootstrap_error_carries_os_text() {
        let err = RcError::Bootstrap {
            stage: "clone",
            source: std::io::Error::from_raw_os_error(1),
        };
        assert!(err.to_string().starts_with("failed to bootstrap container at clone"));
    }
}
