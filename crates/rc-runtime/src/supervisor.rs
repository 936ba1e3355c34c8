//! In-namespace supervisor: the first process of a new container.
//!
//! On entry it mounts a fresh `/proc`, sets the container hostname, applies
//! the operation it was bootstrapped with, then serves lifecycle commands
//! one connection at a time until START replaces its image, STOP ends it,
//! or the channel breaks.

use std::os::unix::net::UnixListener;
use std::path::Path;
use std::time::Duration;

use rc_common::constants::{EXIT_EXEC_FAILURE, EXIT_SETUP_FAILURE, PROC_MOUNT_POINT};
use rc_common::error::{ChannelError, RcError, Result};
use rc_common::types::{CommandLine, ContainerName, LifecycleOperation, Status};
use rc_core::filesystem::mount;
use rc_core::namespace::uts;

use crate::channel::{self, Connection, Request, Response};
use crate::lifecycle::{self, Step, SupervisorState};

/// Everything the supervisor receives across the bootstrap boundary.
#[derive(Debug)]
pub struct SupervisorArgs {
    /// Container name, for diagnostics.
    pub name: ContainerName,
    /// Operation the supervisor was bootstrapped with.
    pub operation: LifecycleOperation,
    /// Command line accompanying the operation.
    pub command: CommandLine,
    /// Listening control socket, bound before bootstrap.
    pub listener: UnixListener,
    /// Hostname to set inside the UTS namespace.
    pub hostname: String,
    /// Bounded wait on each connection's reads and writes.
    pub channel_timeout: Duration,
}

/// What the supervisor does after handling a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Answer and keep serving.
    Reply(Response),
    /// Replace the supervisor image with this command.
    Replace(CommandLine),
    /// Answer, then exit with `code`.
    Exit {
        /// Final answer.
        response: Response,
        /// Supervisor exit status.
        code: i32,
    },
}

/// Supervisor command handling, separate from its OS side effects.
#[derive(Debug, Default)]
pub struct Supervisor {
    state: SupervisorState,
}

impl Supervisor {
    /// Current supervisor state.
    #[must_use]
    pub const fn state(&self) -> &SupervisorState {
        &self.state
    }

    /// Applies one request to the state machine.
    pub fn dispatch(&mut self, request: &Request) -> Dispatch {
        let step = match lifecycle::plan(self.state.phase(), request.operation) {
            Ok(step) => step,
            Err(e) => return reject(&e),
        };
        match step {
            Step::RecordInit => {
                let command = request.command();
                let summary = command.to_string();
                match self.state.create(command) {
                    Ok(()) => {
                        tracing::info!(command = %summary, "init process registered");
                        Dispatch::Reply(Response::ok(format!("init process registered: {summary}")))
                    }
                    Err(e) => reject(&e),
                }
            }
            Step::ReplaceImage => match self.state.start() {
                Ok(command) => Dispatch::Replace(command.clone()),
                Err(e) => reject(&e),
            },
            Step::ShutDown => Dispatch::Exit {
                response: Response::ok("supervisor stopped before start"),
                code: 0,
            },
            // The supervisor never observes the running phase: its image is
            // gone by then.
            Step::JoinAndRun | Step::Terminate | Step::Suspend => reject(&RcError::NotRunning),
        }
    }
}

fn reject(error: &RcError) -> Dispatch {
    tracing::warn!(error = %error, "command rejected");
    Dispatch::Reply(Response::from_error(error))
}

/// Namespace-local setup, in order: own session, private mounts, `/proc`,
/// hostname.
fn setup(hostname: &str) -> Result<()> {
    let _ = nix::unistd::setsid().map_err(|e| RcError::Bootstrap {
        stage: "setsid",
        source: e.into(),
    })?;
    mount::make_mounts_private()?;
    mount::mount_proc(Path::new(PROC_MOUNT_POINT))?;
    uts::set_hostname(hostname)?;
    Ok(())
}

/// Replaces the process image with `command`; returns only on failure.
#[allow(unsafe_code)]
fn replace_image(command: &CommandLine) -> RcError {
    use nix::sys::signal::{SigHandler, Signal, signal};

    // The Rust runtime ignores SIGPIPE; the container command expects the default.
    // SAFETY: restoring the default disposition installs no Rust handler.
    if let Err(e) = unsafe { signal(Signal::SIGPIPE, SigHandler::SigDfl) } {
        tracing::warn!(error = %e, "could not restore SIGPIPE disposition");
    }
    tracing::info!(command = %command, "replacing supervisor with init process");
    execute(command)
}

/// `execvp(3)` wrapper; returns only on failure.
fn execute(command: &CommandLine) -> RcError {
    let argv = match command.to_cstrings() {
        Ok(argv) => argv,
        Err(e) => return e,
    };
    let errno = match nix::unistd::execvp(&argv[0], &argv) {
        Ok(never) => match never {},
        Err(errno) => errno,
    };
    RcError::Exec {
        command: command.program().unwrap_or_default().to_owned(),
        reason: errno.desc().to_owned(),
    }
}

fn respond(conn: &mut Connection, response: &Response) {
    if let Err(e) = conn.respond(response) {
        tracing::warn!(error = %e, "controller went away before the response");
    }
}

/// Serves commands until the supervisor has to stop.
fn serve(supervisor: &mut Supervisor, listener: &UnixListener, timeout: Duration) -> i32 {
    loop {
        let mut conn = match channel::accept(listener, timeout) {
            Ok(conn) => conn,
            Err(e) => {
                tracing::error!(error = %e, "command channel is broken");
                return EXIT_SETUP_FAILURE;
            }
        };
        let request = match conn.receive() {
            Ok(request) => request,
            Err(ChannelError::Closed) => {
                tracing::debug!("controller disconnected without a command");
                continue;
            }
            Err(e) => {
                tracing::warn!(error = %e, "discarding bad request");
                respond(&mut conn, &Response::from_error(&RcError::from(e)));
                continue;
            }
        };

        tracing::info!(operation = %request.operation, "received command");
        match supervisor.dispatch(&request) {
            Dispatch::Reply(response) => respond(&mut conn, &response),
            Dispatch::Replace(command) => {
                let error = replace_image(&command);
                tracing::error!(error = %error, "failed to start init process");
                respond(&mut conn, &Response::from_error(&error));
                return EXIT_EXEC_FAILURE;
            }
            Dispatch::Exit { response, code } => {
                respond(&mut conn, &response);
                tracing::info!(code, "supervisor exiting");
                return code;
            }
        }
    }
}

/// Supervisor entry point; the return value is the process exit status.
pub fn run(args: SupervisorArgs) -> i32 {
    let SupervisorArgs {
        name,
        operation,
        command,
        listener,
        hostname,
        channel_timeout,
    } = args;
    let span = tracing::info_span!("supervisor", name = %name);
    let _guard = span.enter();

    if let Err(e) = setup(&hostname) {
        tracing::error!(error = %e, "container setup failed");
        return EXIT_SETUP_FAILURE;
    }

    let mut supervisor = Supervisor::default();
    let initial = Request {
        operation,
        arguments: command.into_args(),
    };
    // Nobody is connected yet, so a rejection of the initial operation can
    // only be reported in the log.
    match supervisor.dispatch(&initial) {
        Dispatch::Reply(response) if response.status == Status::Ok => {}
        Dispatch::Reply(response) => {
            tracing::error!(message = %response.message, "initial command rejected");
            return EXIT_SETUP_FAILURE;
        }
        Dispatch::Replace(command) => {
            let error = replace_image(&command);
            tracing::error!(error = %error, "failed to start init process");
            return EXIT_EXEC_FAILURE;
        }
        Dispatch::Exit { code, .. } => return code,
    }

    serve(&mut supervisor, &listener, channel_timeout)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create(args: &[&str]) -> Request {
        Request {
            operation: LifecycleOperation::Create,
            arguments: args.iter().map(|a| (*a).to_owned()).collect(),
        }
    }

    fn status_of(dispatch: &Dispatch) -> Option<Status> {
        match dispatch {
            Dispatch::Reply(response) | Dispatch::Exit { response, .. } => Some(response.status),
            Dispatch::Replace(_) => None,
        }
    }

    #[test]
    fn create_then_start_replaces_with_recorded_command() {
        let mut supervisor = Supervisor::default();
        let created = supervisor.dispatch(&create(&["/bin/echo", "hello"]));
        assert_eq!(status_of(&created), Some(Status::Ok));

        let started = supervisor.dispatch(&Request::bare(LifecycleOperation::Start));
        assert_eq!(
            started,
            Dispatch::Replace(CommandLine::new(vec!["/bin/echo".into(), "hello".into()]))
        );
    }

    #[test]
    fn duplicate_create_is_answered_and_serving_continues() {
        let mut supervisor = Supervisor::default();
        let _ = supervisor.dispatch(&create(&["/bin/true"]));
        let again = supervisor.dispatch(&create(&["/bin/false"]));
        assert_eq!(status_of(&again), Some(Status::DuplicateInit));
        assert!(matches!(again, Dispatch::Reply(_)));
        assert_eq!(
            supervisor.state().pending_command().and_then(CommandLine::program),
            Some("/bin/true")
        );
    }

    #[test]
    fn operations_before_create_report_no_init_process() {
        for op in [
            LifecycleOperation::Start,
            LifecycleOperation::Exec,
            LifecycleOperation::Stop,
            LifecycleOperation::Pause,
        ] {
            let mut supervisor = Supervisor::default();
            let outcome = supervisor.dispatch(&Request::bare(op));
            assert_eq!(status_of(&outcome), Some(Status::NoInitProcess), "{op}");
        }
    }

    #[test]
    fn exec_and_pause_before_start_report_not_running() {
        let mut supervisor = Supervisor::default();
        let _ = supervisor.dispatch(&create(&["/bin/sleep", "5"]));
        for op in [LifecycleOperation::Exec, LifecycleOperation::Pause] {
            let outcome = supervisor.dispatch(&Request::bare(op));
            assert_eq!(status_of(&outcome), Some(Status::NotRunning), "{op}");
        }
    }

    #[test]
    fn stop_before_start_exits_cleanly() {
        let mut supervisor = Supervisor::default();
        let _ = supervisor.dispatch(&create(&["/bin/sleep", "5"]));
        let outcome = supervisor.dispatch(&Request::bare(LifecycleOperation::Stop));
        assert!(matches!(outcome, Dispatch::Exit { code: 0, .. }));
    }

    #[test]
    fn empty_create_is_a_bad_request() {
        let mut supervisor = Supervisor::default();
        let outcome = supervisor.dispatch(&create(&[]));
        assert_eq!(status_of(&outcome), Some(Status::BadRequest));
        assert!(!supervisor.state().init_process_exists());
    }

    #[test]
    fn serve_answers_until_stop() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("control.sock");
        let listener = UnixListener::bind(&path).expect("bind");
        let timeout = Duration::from_secs(5);

        let controller = std::thread::spawn(move || {
            let call = |request: Request| {
                let mut client =
                    channel::ChannelClient::connect(&path, timeout).expect("connect");
                client.call(&request).expect("call")
            };
            let duplicate = call(create(&["/bin/true"]));
            let stopped = call(Request::bare(LifecycleOperation::Stop));
            (duplicate, stopped)
        });

        let mut supervisor = Supervisor::default();
        let _ = supervisor.dispatch(&create(&["/bin/sleep", "5"]));
        let code = serve(&mut supervisor, &listener, timeout);
        let (duplicate, stopped) = controller.join().expect("controller thread");

        assert_eq!(code, 0);
        assert!(matches!(
            duplicate,
            channel::Reply::Answered(Response { status: Status::DuplicateInit, .. })
        ));
        assert!(matches!(
            stopped,
            channel::Reply::Answered(Response { status: Status::Ok, .. })
        ));
    }

    #[test]
    fn failed_replacement_reports_exec_error() {
        let error = execute(&CommandLine::new(vec!["/nonexistent/rc-test-binary".into()]));
        assert!(matches!(error, RcError::Exec { ref command, .. } if command == "/nonexistent/rc-test-binary"));
        assert_eq!(error.status(), Status::ExecFailed);
    }
}
