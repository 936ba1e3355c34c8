//! Namespace bootstrap: start an entry point as the first process of a
//! fresh namespace set.
//!
//! The child is held behind a one-shot gate (a pipe) until the controller
//! has finished the steps that must happen from outside, such as writing the
//! user-namespace ID maps. Dropping the [`Gate`] without releasing it makes
//! the child exit instead of running the entry point.

use std::fs::File;
use std::io::{ErrorKind, Read, Write};

use rc_common::constants::EXIT_SETUP_FAILURE;
use rc_common::error::{RcError, Result};

use crate::namespace::NamespaceConfig;

/// Smallest stack accepted for the isolated entry point.
pub const MIN_STACK_SIZE: usize = 64 * 1024;

/// Memory reserved for the isolated entry point's call stack.
///
/// Each bootstrap call borrows its own stack, so one controller can start
/// several containers without sharing a process-wide buffer.
#[derive(Debug)]
pub struct ExecutionStack {
    memory: Vec<u8>,
}

impl ExecutionStack {
    /// Allocates a zeroed stack of `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if `size` is below [`MIN_STACK_SIZE`].
    pub fn new(size: usize) -> Result<Self> {
        if size < MIN_STACK_SIZE {
            return Err(RcError::Config {
                message: format!("stack size {size} is below the minimum of {MIN_STACK_SIZE}"),
            });
        }
        Ok(Self {
            memory: vec![0; size],
        })
    }

    /// Size of the stack in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.memory.len()
    }

    /// Whether the stack has no memory (never true for a constructed stack).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    #[cfg(target_os = "linux")]
    fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.memory
    }
}

/// How a container process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReport {
    /// The process exited with this status.
    Exited(i32),
    /// The process was killed by this signal number.
    Signaled(i32),
}

impl ExitReport {
    /// Shell-style exit code: the status, or `128 + signal`.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Exited(code) => code,
            Self::Signaled(signal) => 128 + signal,
        }
    }

    /// Whether the process exited with status 0.
    #[must_use]
    pub const fn success(self) -> bool {
        matches!(self, Self::Exited(0))
    }
}

/// Handle on a bootstrapped process, as seen from the host PID namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessHandle {
    pid: i32,
}

impl ProcessHandle {
    /// Host PID of the process.
    #[must_use]
    pub const fn pid(&self) -> i32 {
        self.pid
    }

    /// Blocks until the process terminates.
    ///
    /// # Errors
    ///
    /// Returns an error if `waitpid(2)` fails for a reason other than `EINTR`.
    pub fn wait(&self) -> Result<ExitReport> {
        use nix::errno::Errno;
        use nix::sys::wait::{WaitStatus, waitpid};
        use nix::unistd::Pid;

        loop {
            match waitpid(Pid::from_raw(self.pid), None) {
                Ok(WaitStatus::Exited(_, code)) => return Ok(ExitReport::Exited(code)),
                Ok(WaitStatus::Signaled(_, signal, _)) => {
                    return Ok(ExitReport::Signaled(signal as i32));
                }
                Ok(status) => tracing::debug!(?status, "ignoring non-terminal wait status"),
                Err(Errno::EINTR) => {}
                Err(e) => {
                    return Err(RcError::Wait {
                        pid: self.pid,
                        source: e.into(),
                    });
                }
            }
        }
    }

    /// Sends `SIGKILL` to the process.
    ///
    /// # Errors
    ///
    /// Returns an error if `kill(2)` fails.
    pub fn kill(&self) -> Result<()> {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        kill(Pid::from_raw(self.pid), Signal::SIGKILL).map_err(|e| RcError::Signal {
            pid: self.pid,
            signal: "SIGKILL",
            source: e.into(),
        })
    }
}

/// Controller end of the bootstrap gate.
#[derive(Debug)]
pub struct Gate {
    pipe: File,
}

impl Gate {
    /// Lets the child proceed into its entry point.
    ///
    /// # Errors
    ///
    /// Returns an error if the byte cannot be written (the child is gone).
    pub fn release(mut self) -> Result<()> {
        self.pipe.write_all(&[1]).map_err(|e| RcError::Bootstrap {
            stage: "release gate",
            source: e,
        })
    }
}

/// A freshly cloned process waiting behind its gate.
#[derive(Debug)]
pub struct Bootstrapped {
    /// The new process.
    pub process: ProcessHandle,
    /// Gate the controller releases once preparation is done.
    pub gate: Gate,
}

/// Blocks the child until the controller releases the gate.
fn wait_for_release(mut pipe: File) -> std::io::Result<()> {
    let mut byte = [0_u8; 1];
    loop {
        match pipe.read(&mut byte) {
            Ok(1) => return Ok(()),
            Ok(_) => {
                return Err(std::io::Error::new(
                    ErrorKind::UnexpectedEof,
                    "controller closed the bootstrap gate",
                ));
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
}

/// Starts `entry` as the first process inside a new namespace set.
///
/// The child runs on `stack`, with a private copy of the caller's memory
/// and file descriptors. Values captured by `entry` are dropped in the
/// caller once the clone has happened, so descriptors meant only for the
/// child are closed on the controller side automatically. The value
/// returned by `entry` becomes the child's exit status.
///
/// # Errors
///
/// Returns [`RcError::Bootstrap`] if the gate pipe cannot be created or
/// `clone(2)` fails (insufficient privilege, unsupported namespace,
/// resource exhaustion).
#[cfg(target_os = "linux")]
#[allow(unsafe_code)]
pub fn bootstrap<F>(
    namespaces: &NamespaceConfig,
    stack: &mut ExecutionStack,
    entry: F,
) -> Result<Bootstrapped>
where
    F: FnOnce() -> i32,
{
    use nix::fcntl::OFlag;
    use nix::sched::{CloneCb, clone};
    use nix::sys::signal::Signal;
    use nix::unistd::pipe2;

    let (gate_rx, gate_tx) = pipe2(OFlag::O_CLOEXEC).map_err(|e| RcError::Bootstrap {
        stage: "gate pipe",
        source: e.into(),
    })?;

    let mut child_gate = Some(gate_rx);
    let mut controller_gate = Some(gate_tx);
    let mut entry = Some(entry);

    let callback: CloneCb<'_> = Box::new(|| {
        drop(controller_gate.take());
        let Some(gate) = child_gate.take() else {
            return EXIT_SETUP_FAILURE as isize;
        };
        if let Err(e) = wait_for_release(File::from(gate)) {
            tracing::error!(error = %e, "bootstrap gate was never released");
            return EXIT_SETUP_FAILURE as isize;
        }
        entry.take().map_or(EXIT_SETUP_FAILURE, |run| run()) as isize
    });

    let flags = namespaces.clone_flags();
    // SAFETY: the child receives a copy of this single-threaded address space
    // (no CLONE_VM) and runs `callback` on `stack`, which stays alive and
    // exclusively borrowed for the duration of the call.
    let pid = unsafe {
        clone(
            callback,
            stack.as_mut_slice(),
            flags,
            Some(Signal::SIGCHLD as libc::c_int),
        )
    }
    .map_err(|e| RcError::Bootstrap {
        stage: "clone",
        source: e.into(),
    })?;

    drop(child_gate);
    drop(entry);
    let Some(gate_tx) = controller_gate else {
        return Err(RcError::Bootstrap {
            stage: "gate pipe",
            source: std::io::Error::other("controller end of the gate was consumed"),
        });
    };

    tracing::info!(pid = pid.as_raw(), ?flags, "bootstrapped isolated process");
    Ok(Bootstrapped {
        process: ProcessHandle { pid: pid.as_raw() },
        gate: Gate {
            pipe: File::from(gate_tx),
        },
    })
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error: namespace bootstrap requires Linux.
#[cfg(not(target_os = "linux"))]
pub fn bootstrap<F>(
    _namespaces: &NamespaceConfig,
    _stack: &mut ExecutionStack,
    _entry: F,
) -> Result<Bootstrapped>
where
    F: FnOnce() -> i32,
{
    Err(RcError::Config {
        message: "Linux required for native container operations".into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_is_sized_per_call() {
        let stack = ExecutionStack::new(rc_common::constants::DEFAULT_STACK_SIZE);
        assert_eq!(stack.map(|s| s.len()).ok(), Some(1024 * 1024));
    }

    #[test]
    fn tiny_stack_is_rejected() {
        assert!(ExecutionStack::new(1024).is_err());
    }

    #[test]
    fn exit_report_codes_follow_shell_convention() {
        assert_eq!(ExitReport::Exited(3).code(), 3);
        assert_eq!(ExitReport::Signaled(9).code(), 137);
        assert!(ExitReport::Exited(0).success());
        assert!(!ExitReport::Signaled(15).success());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn gate_release_is_observed_by_waiter() {
        let (rx, tx) = nix::unistd::pipe().expect("pipe");
        let gate = Gate {
            pipe: File::from(tx),
        };
        assert!(gate.release().is_ok());
        assert!(wait_for_release(File::from(rx)).is_ok());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn dropped_gate_is_reported_to_waiter() {
        let (rx, tx) = nix::unistd::pipe().expect("pipe");
        drop(tx);
        let err = wait_for_release(File::from(rx)).expect_err("gate was dropped");
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
    }

    #[cfg(target_os = "linux")]
    fn no_namespaces() -> NamespaceConfig {
        NamespaceConfig {
            pid: false,
            mount: false,
            network: false,
            user: false,
            ipc: false,
            uts: false,
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn released_child_runs_entry_point() {
        let mut stack = ExecutionStack::new(MIN_STACK_SIZE).expect("stack");
        let Bootstrapped { process, gate } =
            bootstrap(&no_namespaces(), &mut stack, || 7).expect("bootstrap");
        gate.release().expect("release");
        assert_eq!(process.wait().expect("wait"), ExitReport::Exited(7));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn unreleased_child_never_runs_entry_point() {
        let mut stack = ExecutionStack::new(MIN_STACK_SIZE).expect("stack");
        let Bootstrapped { process, gate } =
            bootstrap(&no_namespaces(), &mut stack, || 7).expect("bootstrap");
        drop(gate);
        assert_eq!(
            process.wait().expect("wait"),
            ExitReport::Exited(EXIT_SETUP_FAILURE)
        );
    }
}
