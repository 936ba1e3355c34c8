//! Lifecycle state machine shared by the supervisor and the controller.
//!
//! ```text
//! NoInit --CREATE--> InitPending --START--> Running (supervisor image replaced)
//! ```
//!
//! Steps planned for `InitPending` run inside the supervisor; steps planned
//! for `Running` run in the controller, because by then the supervisor's
//! image has been replaced by the container command.

use std::fmt;

use rc_common::error::{RcError, Result};
use rc_common::types::{CommandLine, LifecycleOperation};

/// Observable phase of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// No CREATE has succeeded.
    NoInit,
    /// An entry command is registered and the supervisor awaits START.
    InitPending,
    /// The supervisor has been replaced by the entry command.
    Running,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoInit => write!(f, "no-init"),
            Self::InitPending => write!(f, "init-pending"),
            Self::Running => write!(f, "running"),
        }
    }
}

/// Action that carries out an accepted operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    /// Record the entry command (CREATE).
    RecordInit,
    /// Replace the supervisor image with the entry command (START).
    ReplaceImage,
    /// Acknowledge and end the waiting supervisor (STOP before START).
    ShutDown,
    /// Run another command inside the container's namespaces (EXEC).
    JoinAndRun,
    /// Signal the container init to terminate (STOP).
    Terminate,
    /// Suspend or resume the container's process group (PAUSE).
    Suspend,
}

/// Decides what an operation means in a phase.
///
/// # Errors
///
/// - [`RcError::NoInitProcess`] for anything but CREATE before a CREATE succeeded.
/// - [`RcError::DuplicateInit`] for CREATE once an init process exists.
/// - [`RcError::NotRunning`] for EXEC or PAUSE before START.
/// - [`RcError::AlreadyRunning`] for START after START.
pub const fn plan(phase: Phase, operation: LifecycleOperation) -> Result<Step> {
    use LifecycleOperation::{Create, Exec, Pause, Start, Stop};

    match (phase, operation) {
        (Phase::NoInit, Create) => Ok(Step::RecordInit),
        (Phase::NoInit, Start | Exec | Stop | Pause) => Err(RcError::NoInitProcess),
        (Phase::InitPending | Phase::Running, Create) => Err(RcError::DuplicateInit),
        (Phase::InitPending, Start) => Ok(Step::ReplaceImage),
        (Phase::InitPending, Stop) => Ok(Step::ShutDown),
        (Phase::InitPending, Exec | Pause) => Err(RcError::NotRunning),
        (Phase::Running, Start) => Err(RcError::AlreadyRunning),
        (Phase::Running, Exec) => Ok(Step::JoinAndRun),
        (Phase::Running, Stop) => Ok(Step::Terminate),
        (Phase::Running, Pause) => Ok(Step::Suspend),
    }
}

/// Mutable state owned by the supervisor process.
///
/// Discarded when the supervisor replaces its image or exits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupervisorState {
    pending_command: Option<CommandLine>,
}

impl SupervisorState {
    /// Whether a CREATE has been accepted.
    #[must_use]
    pub const fn init_process_exists(&self) -> bool {
        self.pending_command.is_some()
    }

    /// The entry command recorded by CREATE.
    #[must_use]
    pub const fn pending_command(&self) -> Option<&CommandLine> {
        self.pending_command.as_ref()
    }

    /// Phase as seen from inside the supervisor, which never observes `Running`.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        if self.init_process_exists() {
            Phase::InitPending
        } else {
            Phase::NoInit
        }
    }

    /// Handles CREATE: records `command` as the entry command.
    ///
    /// # Errors
    ///
    /// Returns [`RcError::DuplicateInit`] if an entry command is already
    /// recorded (the recorded command is left unchanged), or
    /// [`RcError::Config`] if `command` is empty.
    pub fn create(&mut self, command: CommandLine) -> Result<()> {
        let _ = plan(self.phase(), LifecycleOperation::Create)?;
        if command.is_empty() {
            return Err(RcError::Config {
                message: "create requires a command".into(),
            });
        }
        self.pending_command = Some(command);
        Ok(())
    }

    /// Handles START: returns the command to replace the supervisor with.
    ///
    /// # Errors
    ///
    /// Returns [`RcError::NoInitProcess`] if no CREATE has been accepted.
    pub fn start(&self) -> Result<&CommandLine> {
        let _ = plan(self.phase(), LifecycleOperation::Start)?;
        self.pending_command.as_ref().ok_or(RcError::NoInitProcess)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo() -> CommandLine {
        CommandLine::new(vec!["/bin/echo".into(), "hello".into()])
    }

    #[test]
    fn create_then_start_yields_recorded_command() {
        let mut state = SupervisorState::default();
        state.create(echo()).expect("first create");
        assert!(state.init_process_exists());
        assert_eq!(state.start().expect("start after create"), &echo());
    }

    #[test]
    fn second_create_is_rejected_and_keeps_pending_command() {
        let mut state = SupervisorState::default();
        state.create(echo()).expect("first create");
        let err = state
            .create(CommandLine::new(vec!["/bin/true".into()]))
            .expect_err("second create");
        assert!(matches!(err, RcError::DuplicateInit));
        assert_eq!(state.pending_command(), Some(&echo()));
    }

    #[test]
    fn start_without_create_is_rejected() {
        let state = SupervisorState::default();
        assert!(matches!(state.start(), Err(RcError::NoInitProcess)));
    }

    #[test]
    fn empty_create_leaves_state_untouched() {
        let mut state = SupervisorState::default();
        assert!(state.create(CommandLine::default()).is_err());
        assert!(!state.init_process_exists());
    }

    #[test]
    fn every_operation_but_create_needs_an_init_process() {
        for op in LifecycleOperation::ALL {
            let planned = plan(Phase::NoInit, op);
            if op == LifecycleOperation::Create {
                assert_eq!(planned.ok(), Some(Step::RecordInit));
            } else {
                assert!(matches!(planned, Err(RcError::NoInitProcess)), "{op}");
            }
        }
    }

    #[test]
    fn create_is_duplicate_once_init_exists() {
        for phase in [Phase::InitPending, Phase::Running] {
            assert!(matches!(
                plan(phase, LifecycleOperation::Create),
                Err(RcError::DuplicateInit)
            ));
        }
    }

    #[test]
    fn pending_phase_only_accepts_start_and_stop() {
        assert_eq!(
            plan(Phase::InitPending, LifecycleOperation::Start).ok(),
            Some(Step::ReplaceImage)
        );
        assert_eq!(
            plan(Phase::InitPending, LifecycleOperation::Stop).ok(),
            Some(Step::ShutDown)
        );
        assert!(matches!(
            plan(Phase::InitPending, LifecycleOperation::Exec),
            Err(RcError::NotRunning)
        ));
        assert!(matches!(
            plan(Phase::InitPending, LifecycleOperation::Pause),
            Err(RcError::NotRunning)
        ));
    }

    #[test]
    fn running_phase_drives_the_supervised_process() {
        assert_eq!(
            plan(Phase::Running, LifecycleOperation::Exec).ok(),
            Some(Step::JoinAndRun)
        );
        assert_eq!(
            plan(Phase::Running, LifecycleOperation::Stop).ok(),
            Some(Step::Terminate)
        );
        assert_eq!(
            plan(Phase::Running, LifecycleOperation::Pause).ok(),
            Some(Step::Suspend)
        );
        assert!(matches!(
            plan(Phase::Running, LifecycleOperation::Start),
            Err(RcError::AlreadyRunning)
        ));
    }
}
