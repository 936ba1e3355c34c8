//! Controller engine that drives container lifecycle operations.
//!
//! Each invocation observes the container's phase and routes the
//! operation: a waiting supervisor decides for itself over the command
//! channel, everything else is planned here with the same state machine.

use rc_common::config::RuntimeConfig;
use rc_common::error::{ChannelError, RcError, Result};
use rc_common::types::{CommandLine, ContainerName, LifecycleOperation};
use rc_core::bootstrap::{self, Bootstrapped, ExecutionStack, ExitReport, ProcessHandle};
use rc_core::namespace::NamespaceConfig;
use rc_core::namespace::user::{self, IdMapping};
use rc_core::namespace::uts;

use crate::channel::{ChannelClient, Reply, Request};
use crate::container::{ContainerDir, CreateLock, Observation};
use crate::lifecycle::{self, Step};
use crate::state::StateEntry;
use crate::supervisor::{self, SupervisorArgs};

/// Argument a PAUSE request carries to resume instead of suspend.
pub const RESUME_ARGUMENT: &str = "resume";

/// Result of a completed operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The operation finished; the message describes what happened.
    Completed(String),
    /// A container process ran to completion.
    Exited(ExitReport),
}

/// The controller that coordinates all container operations.
#[derive(Debug, Clone)]
pub struct Engine {
    config: RuntimeConfig,
    namespaces: NamespaceConfig,
}

impl Engine {
    /// Creates an engine isolating the default namespace set.
    #[must_use]
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            namespaces: NamespaceConfig::default(),
        }
    }

    /// Replaces the namespace set new containers are created with.
    #[must_use]
    pub const fn with_namespaces(mut self, namespaces: NamespaceConfig) -> Self {
        self.namespaces = namespaces;
        self
    }

    /// Runtime configuration in use.
    #[must_use]
    pub const fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    fn dir(&self, name: &ContainerName) -> ContainerDir {
        ContainerDir::new(&self.config.root_dir, name.clone())
    }

    /// Creates a container whose entry command is `command`, then blocks
    /// until the container exits.
    ///
    /// # Errors
    ///
    /// Returns [`RcError::DuplicateInit`] if the container already exists,
    /// [`RcError::Bootstrap`] if the namespaces cannot be created, or
    /// [`RcError::Wait`] if the container cannot be waited for.
    pub fn create(&self, name: &ContainerName, command: &CommandLine) -> Result<ExitReport> {
        if command.is_empty() {
            return Err(RcError::Config {
                message: "create requires a command".into(),
            });
        }
        uts::validate_hostname(&self.config.hostname)?;
        let request = Request::with_command(LifecycleOperation::Create, command);
        match self.perform(name, &request)? {
            Outcome::Exited(report) => Ok(report),
            Outcome::Completed(_) => Err(RcError::DuplicateInit),
        }
    }

    /// Starts a created container's entry command.
    ///
    /// # Errors
    ///
    /// Returns [`RcError::NoInitProcess`] if the container was never
    /// created, [`RcError::AlreadyRunning`] if it is running, or
    /// [`RcError::Rejected`] if the entry command could not be executed.
    pub fn start(&self, name: &ContainerName) -> Result<String> {
        self.perform(name, &Request::bare(LifecycleOperation::Start))
            .map(describe)
    }

    /// Runs `command` inside a running container and waits for it.
    ///
    /// # Errors
    ///
    /// Returns [`RcError::NoInitProcess`] or [`RcError::NotRunning`] if the
    /// container is not running, or an error if joining its namespaces fails.
    pub fn exec(&self, name: &ContainerName, command: &CommandLine) -> Result<ExitReport> {
        if command.is_empty() {
            return Err(RcError::Config {
                message: "exec requires a command".into(),
            });
        }
        let request = Request::with_command(LifecycleOperation::Exec, command);
        Ok(match self.perform(name, &request)? {
            Outcome::Exited(report) => report,
            Outcome::Completed(_) => ExitReport::Exited(0),
        })
    }

    /// Terminates a container; a created but unstarted one is discarded.
    ///
    /// # Errors
    ///
    /// Returns [`RcError::NoInitProcess`] if no container exists, or an
    /// error if the signal cannot be delivered.
    pub fn stop(&self, name: &ContainerName) -> Result<String> {
        self.perform(name, &Request::bare(LifecycleOperation::Stop))
            .map(describe)
    }

    /// Suspends (or, with `resume`, resumes) a running container.
    ///
    /// # Errors
    ///
    /// Returns [`RcError::NoInitProcess`] or [`RcError::NotRunning`] if the
    /// container is not running, or an error if the signal cannot be delivered.
    pub fn pause(&self, name: &ContainerName, resume: bool) -> Result<String> {
        let mut request = Request::bare(LifecycleOperation::Pause);
        if resume {
            request.arguments.push(RESUME_ARGUMENT.to_owned());
        }
        self.perform(name, &request).map(describe)
    }

    /// Routes one request according to the container's observed phase.
    ///
    /// # Errors
    ///
    /// Returns the lifecycle rejection or the failure of the step carried out.
    pub fn perform(&self, name: &ContainerName, request: &Request) -> Result<Outcome> {
        let dir = self.dir(name);
        // Creates of one name are serialized until the new record is saved.
        let lock = match request.operation {
            LifecycleOperation::Create => Some(dir.lock()?),
            _ => None,
        };
        let observation = dir.observe(self.config.channel_timeout())?;
        let stale = matches!(observation, Observation::Stale);
        tracing::debug!(
            name = %name,
            operation = %request.operation,
            phase = %observation.phase(),
            "observed container"
        );

        match observation {
            Observation::Pending { mut client, .. } => forward(&mut client, request),
            Observation::Absent | Observation::Stale => {
                match lifecycle::plan(lifecycle::Phase::NoInit, request.operation)? {
                    Step::RecordInit => self
                        .launch(&dir, request.command(), stale, lock)
                        .map(Outcome::Exited),
                    step => Err(supervisor_gone(name, step)),
                }
            }
            Observation::Running { entry } => {
                let pid = entry.pid;
                match lifecycle::plan(lifecycle::Phase::Running, request.operation)? {
                    Step::JoinAndRun => {
                        crate::exec::exec_in_container(name, pid, &request.command())
                            .map(Outcome::Exited)
                    }
                    Step::Terminate => {
                        crate::process::terminate(pid, self.config.stop_grace())?;
                        Ok(Outcome::Completed(format!("container {name} stopped")))
                    }
                    Step::Suspend if is_resume(request) => {
                        crate::process::resume(pid)?;
                        Ok(Outcome::Completed(format!("container {name} resumed")))
                    }
                    Step::Suspend => {
                        crate::process::suspend(pid)?;
                        Ok(Outcome::Completed(format!("container {name} paused")))
                    }
                    step => Err(supervisor_gone(name, step)),
                }
            }
        }
    }

    /// Bootstraps a supervisor for `dir` and waits for the container to exit.
    fn launch(
        &self,
        dir: &ContainerDir,
        command: CommandLine,
        stale: bool,
        lock: Option<CreateLock>,
    ) -> Result<ExitReport> {
        // Left over from a controller that did not get to clean up.
        if stale {
            tracing::info!(name = %dir.name(), "replacing stale container directory");
            dir.remove()?;
        }
        let listener = dir.prepare()?;
        let result = self.bootstrap_and_wait(dir, listener, command, lock);
        if let Err(e) = dir.remove() {
            tracing::warn!(error = %e, "failed to remove container directory");
        }
        result
    }

    fn bootstrap_and_wait(
        &self,
        dir: &ContainerDir,
        listener: std::os::unix::net::UnixListener,
        command: CommandLine,
        lock: Option<CreateLock>,
    ) -> Result<ExitReport> {
        let mut stack = ExecutionStack::new(self.config.stack_size)?;
        let args = SupervisorArgs {
            name: dir.name().clone(),
            operation: LifecycleOperation::Create,
            command: command.clone(),
            listener,
            hostname: self.config.hostname.clone(),
            channel_timeout: self.config.channel_timeout(),
        };
        let Bootstrapped { process, gate } =
            bootstrap::bootstrap(&self.namespaces, &mut stack, move || supervisor::run(args))?;
        drop(stack);

        if let Err(e) = self.prepare_child(dir, process, command) {
            drop(gate);
            abandon(process);
            return Err(e);
        }
        drop(lock);
        if let Err(e) = gate.release() {
            abandon(process);
            return Err(e);
        }

        forward_interrupts(process);
        let report = process.wait()?;
        tracing::info!(name = %dir.name(), ?report, "init process exited");
        Ok(report)
    }

    /// Steps that must happen from outside before the supervisor may run.
    fn prepare_child(
        &self,
        dir: &ContainerDir,
        process: ProcessHandle,
        command: CommandLine,
    ) -> Result<()> {
        if self.namespaces.user {
            user::write_id_maps(process.pid(), &IdMapping::current_user())?;
        }
        let start_time = crate::process::start_time(process.pid()).ok_or_else(|| {
            RcError::Bootstrap {
                stage: "record start time",
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "bootstrapped process vanished",
                ),
            }
        })?;
        dir.save(&StateEntry::new(
            dir.name().clone(),
            process.pid(),
            start_time,
            command,
            self.config.hostname.clone(),
        ))
    }
}

/// Sends a request to a waiting supervisor and interprets the reply.
fn forward(client: &mut ChannelClient, request: &Request) -> Result<Outcome> {
    match client.call(request)? {
        Reply::Answered(response) => {
            response.status.into_result(response.message.clone())?;
            Ok(Outcome::Completed(response.message))
        }
        // Only START hangs up on purpose: its connection closes with the
        // supervisor image.
        Reply::HungUp if request.operation == LifecycleOperation::Start => {
            Ok(Outcome::Completed("init process started".into()))
        }
        Reply::HungUp => Err(ChannelError::Closed.into()),
    }
}

fn is_resume(request: &Request) -> bool {
    request.arguments.iter().any(|a| a == RESUME_ARGUMENT)
}

fn describe(outcome: Outcome) -> String {
    match outcome {
        Outcome::Completed(message) => message,
        Outcome::Exited(report) => format!("process exited with status {}", report.code()),
    }
}

/// Error for steps that need a supervisor no longer (or not yet) there.
fn supervisor_gone(name: &ContainerName, step: Step) -> RcError {
    tracing::debug!(name = %name, ?step, "step requires a waiting supervisor");
    RcError::NotFound {
        kind: "supervisor",
        id: name.to_string(),
    }
}

/// Kills and reaps a child that will never be released.
fn abandon(process: ProcessHandle) {
    if let Err(e) = process.kill() {
        tracing::debug!(error = %e, "child already gone");
    }
    if let Err(e) = process.wait() {
        tracing::warn!(error = %e, "failed to reap abandoned child");
    }
}

/// Makes Ctrl+C on the controller kill the container, so the controller's
/// wait returns and the container directory is cleaned up.
fn forward_interrupts(process: ProcessHandle) {
    let result = ctrlc::set_handler(move || {
        if let Err(e) = process.kill() {
            tracing::debug!(error = %e, "container already gone");
        }
    });
    if let Err(e) = result {
        tracing::warn!(error = %e, "failed to install interrupt handler");
    }
}
