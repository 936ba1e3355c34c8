//! Domain primitive types used across the rc workspace.

use std::ffi::CString;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ChannelError, RcError, Result};

/// Lifecycle operation selected by a controller invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleOperation {
    /// Register the container's entry command without running it.
    Create,
    /// Replace the supervisor with the registered entry command.
    Start,
    /// Run an additional command inside the running container.
    Exec,
    /// Terminate the container.
    Stop,
    /// Suspend (or resume) the container's process group.
    Pause,
}

impl LifecycleOperation {
    /// Every operation, in wire-code order.
    pub const ALL: [Self; 5] = [Self::Create, Self::Start, Self::Exec, Self::Stop, Self::Pause];

    /// Wire code of this operation.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Create => 0,
            Self::Start => 1,
            Self::Exec => 2,
            Self::Stop => 3,
            Self::Pause => 4,
        }
    }

    /// Decodes a wire code.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::UnknownOperation`] for codes outside `0..=4`.
    pub const fn from_code(code: u8) -> std::result::Result<Self, ChannelError> {
        match code {
            0 => Ok(Self::Create),
            1 => Ok(Self::Start),
            2 => Ok(Self::Exec),
            3 => Ok(Self::Stop),
            4 => Ok(Self::Pause),
            other => Err(ChannelError::UnknownOperation(other)),
        }
    }

    /// Lowercase command-line token for this operation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Start => "start",
            Self::Exec => "exec",
            Self::Stop => "stop",
            Self::Pause => "pause",
        }
    }
}

impl fmt::Display for LifecycleOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleOperation {
    type Err = RcError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| RcError::Config {
                message: format!("operation not recognized: {s}"),
            })
    }
}

/// Validated container name, usable as a directory name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContainerName(String);

impl ContainerName {
    /// Validates and wraps a container name.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty, longer than
    /// [`MAX_NAME_LEN`](crate::constants::MAX_NAME_LEN), starts with `.`, or
    /// contains characters outside `[A-Za-z0-9_.-]`.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let valid_chars = name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if name.is_empty()
            || name.len() > crate::constants::MAX_NAME_LEN
            || name.starts_with('.')
            || !valid_chars
        {
            return Err(RcError::Config {
                message: format!("invalid container name: {name:?}"),
            });
        }
        Ok(Self(name))
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ContainerName {
    type Error = RcError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ContainerName> for String {
    fn from(name: ContainerName) -> Self {
        name.0
    }
}

impl fmt::Display for ContainerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Program and arguments run as a container process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandLine(Vec<String>);

impl CommandLine {
    /// Wraps an argument vector; the first element is the program.
    #[must_use]
    pub const fn new(argv: Vec<String>) -> Self {
        Self(argv)
    }

    /// Program to execute, if any.
    #[must_use]
    pub fn program(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// Whether the command line has no program.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// All arguments, program included.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.0
    }

    /// Consumes the command line into its argument vector.
    #[must_use]
    pub fn into_args(self) -> Vec<String> {
        self.0
    }

    /// Converts to the NUL-terminated form `execvp(3)` expects.
    ///
    /// # Errors
    ///
    /// Returns an error if the command line is empty or an argument
    /// contains an interior NUL byte.
    pub fn to_cstrings(&self) -> Result<Vec<CString>> {
        if self.0.is_empty() {
            return Err(RcError::Config {
                message: "command line is empty".into(),
            });
        }
        self.0
            .iter()
            .map(|arg| {
                CString::new(arg.as_str()).map_err(|_| RcError::Config {
                    message: format!("argument contains a NUL byte: {arg:?}"),
                })
            })
            .collect()
    }
}

impl From<Vec<String>> for CommandLine {
    fn from(argv: Vec<String>) -> Self {
        Self(argv)
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" "))
    }
}

/// Result status carried by a command channel response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// The command was accepted.
    Ok,
    /// CREATE rejected: an init process already exists.
    DuplicateInit,
    /// Command rejected: no init process has been created.
    NoInitProcess,
    /// Command rejected: the container has not been started.
    NotRunning,
    /// START rejected: the container is already running.
    AlreadyRunning,
    /// START failed to execute the container command.
    ExecFailed,
    /// The request was malformed or could not be served.
    BadRequest,
}

impl Status {
    /// Wire code of this status.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::DuplicateInit => 1,
            Self::NoInitProcess => 2,
            Self::NotRunning => 3,
            Self::AlreadyRunning => 4,
            Self::ExecFailed => 5,
            Self::BadRequest => 6,
        }
    }

    /// Decodes a wire code.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::UnknownStatus`] for unassigned codes.
    pub const fn from_code(code: i32) -> std::result::Result<Self, ChannelError> {
        match code {
            0 => Ok(Self::Ok),
            1 => Ok(Self::DuplicateInit),
            2 => Ok(Self::NoInitProcess),
            3 => Ok(Self::NotRunning),
            4 => Ok(Self::AlreadyRunning),
            5 => Ok(Self::ExecFailed),
            6 => Ok(Self::BadRequest),
            other => Err(ChannelError::UnknownStatus(other)),
        }
    }

    /// Turns a reported status back into the error it stands for.
    ///
    /// # Errors
    ///
    /// Returns the matching [`RcError`] for every status except [`Status::Ok`].
    pub fn into_result(self, message: String) -> Result<()> {
        match self {
            Self::Ok => Ok(()),
            Self::DuplicateInit => Err(RcError::DuplicateInit),
            Self::NoInitProcess => Err(RcError::NoInitProcess),
            Self::NotRunning => Err(RcError::NotRunning),
            Self::AlreadyRunning => Err(RcError::AlreadyRunning),
            Self::ExecFailed | Self::BadRequest => Err(RcError::Rejected {
                status: self,
                message,
            }),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Ok => "ok",
            Self::DuplicateInit => "duplicate-init",
            Self::NoInitProcess => "no-init-process",
            Self::NotRunning => "not-running",
            Self::AlreadyRunning => "already-running",
            Self::ExecFailed => "exec-failed",
            Self::BadRequest => "bad-request",
        };
        f.write_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_parses_first_cli_token() {
        assert_eq!("create".parse::<LifecycleOperation>().ok(), Some(LifecycleOperation::Create));
        assert_eq!("pause".parse::<LifecycleOperation>().ok(), Some(LifecycleOperation::Pause));
        assert!("run".parse::<LifecycleOperation>().is_err());
    }

    #[test]
    fn operation_codes_are_stable() {
        for op in LifecycleOperation::ALL {
            assert_eq!(LifecycleOperation::from_code(op.code()).ok(), Some(op));
        }
        assert!(matches!(
            LifecycleOperation::from_code(5),
            Err(ChannelError::UnknownOperation(5))
        ));
    }

    #[test]
    fn container_name_rejects_path_tricks() {
        assert!(ContainerName::new("c1").is_ok());
        assert!(ContainerName::new("web_app-2.v1").is_ok());
        assert!(ContainerName::new("").is_err());
        assert!(ContainerName::new("..").is_err());
        assert!(ContainerName::new("a/b").is_err());
        assert!(ContainerName::new("x".repeat(65)).is_err());
    }

    #[test]
    fn container_name_deserialization_validates() {
        let ok: std::result::Result<ContainerName, _> = serde_json::from_str("\"c1\"");
        assert!(ok.is_ok());
        let bad: std::result::Result<ContainerName, _> = serde_json::from_str("\"../etc\"");
        assert!(bad.is_err());
    }

    #[test]
    fn command_line_exposes_program() {
        let cmd = CommandLine::new(vec!["/bin/echo".into(), "hello".into()]);
        assert_eq!(cmd.program(), Some("/bin/echo"));
        assert_eq!(cmd.to_string(), "/bin/echo hello");
        assert_eq!(cmd.to_cstrings().map(|v| v.len()).ok(), Some(2));
    }

    #[test]
    fn command_line_rejects_empty_and_nul() {
        assert!(CommandLine::default().to_cstrings().is_err());
        let cmd = CommandLine::new(vec!["a\0b".into()]);
        assert!(cmd.to_cstrings().is_err());
    }

    #[test]
    fn status_maps_back_to_lifecycle_errors() {
        assert!(Status::Ok.into_result(String::new()).is_ok());
        assert!(matches!(
            Status::DuplicateInit.into_result(String::new()),
            Err(RcError::DuplicateInit)
        ));
        assert!(matches!(
            Status::ExecFailed.into_result("boom".into()),
            Err(RcError::Rejected { status: Status::ExecFailed, .. })
        ));
        assert!(Status::from_code(42).is_err());
    }
}
