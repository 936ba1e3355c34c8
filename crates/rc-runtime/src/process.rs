//! Signal delivery to running containers.
//!
//! The container init runs in its own session, so its host PID is also
//! the ID of the process group holding the container's processes.

use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill, killpg};
use nix::unistd::Pid;
use rc_common::error::{RcError, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Fields of `/proc/<pid>/stat` that follow the parenthesised command
/// name, which may itself contain spaces or parentheses. Index 0 is the
/// process state (field 3 in proc(5)).
fn stat_fields(pid: i32) -> Option<Vec<String>> {
    if pid <= 0 {
        return None;
    }
    let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    let end = stat.rfind(')')?;
    Some(stat[end + 1..].split_whitespace().map(str::to_owned).collect())
}

/// Whether `pid` names a live (not zombie) process.
#[must_use]
pub fn is_alive(pid: i32) -> bool {
    stat_fields(pid).is_some_and(|fields| {
        !matches!(fields.first().map(String::as_str), None | Some("Z" | "X" | "x"))
    })
}

/// Whether the process `pid` is stopped by a signal.
#[must_use]
pub fn is_stopped(pid: i32) -> bool {
    stat_fields(pid).is_some_and(|fields| fields.first().map(String::as_str) == Some("T"))
}

/// Start time of `pid` in clock ticks since boot (field 22 in proc(5)).
///
/// Together with the PID it identifies one process across PID reuse.
#[must_use]
pub fn start_time(pid: i32) -> Option<u64> {
    stat_fields(pid)?.get(19)?.parse().ok()
}

/// Whether `pid` is alive and is the same process that started at
/// `started` ticks after boot.
#[must_use]
pub fn is_same_process(pid: i32, started: u64) -> bool {
    is_alive(pid) && start_time(pid) == Some(started)
}

fn send(pid: i32, signal: Signal) -> Result<()> {
    kill(Pid::from_raw(pid), signal).map_err(|e| RcError::Signal {
        pid,
        signal: signal.as_str(),
        source: e.into(),
    })
}

fn send_group(pgid: i32, signal: Signal) -> Result<()> {
    killpg(Pid::from_raw(pgid), signal).map_err(|e| RcError::Signal {
        pid: -pgid,
        signal: signal.as_str(),
        source: e.into(),
    })
}

fn wait_gone(pid: i32, grace: Duration) -> bool {
    let deadline = Instant::now() + grace;
    while Instant::now() < deadline {
        if !is_alive(pid) {
            return true;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
    !is_alive(pid)
}

/// Terminates a container init: SIGTERM, then SIGKILL after `grace`.
///
/// Outside its own PID namespace the init only receives SIGTERM if it
/// installed a handler, hence the unconditional escalation.
///
/// # Errors
///
/// Returns an error if a signal cannot be delivered or the process
/// survives SIGKILL.
pub fn terminate(pid: i32, grace: Duration) -> Result<()> {
    match send(pid, Signal::SIGTERM) {
        Ok(()) => tracing::info!(pid, "sent SIGTERM"),
        Err(RcError::Signal { source, .. }) if source.raw_os_error() == Some(Errno::ESRCH as i32) => {
            return Ok(());
        }
        Err(e) => return Err(e),
    }
    // A stopped process cannot act on SIGTERM.
    if is_stopped(pid) {
        if let Err(e) = send_group(pid, Signal::SIGCONT) {
            tracing::debug!(error = %e, "could not continue stopped container");
        }
    }
    if wait_gone(pid, grace) {
        return Ok(());
    }

    send(pid, Signal::SIGKILL)?;
    tracing::info!(pid, "sent SIGKILL");
    if wait_gone(pid, grace.max(Duration::from_secs(1))) {
        Ok(())
    } else {
        Err(RcError::Signal {
            pid,
            signal: Signal::SIGKILL.as_str(),
            source: std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "process still alive after SIGKILL",
            ),
        })
    }
}

/// Suspends every process in the container's process group.
///
/// # Errors
///
/// Returns an error if `SIGSTOP` cannot be delivered.
pub fn suspend(pgid: i32) -> Result<()> {
    send_group(pgid, Signal::SIGSTOP)?;
    tracing::info!(pgid, "container suspended");
    Ok(())
}

/// Resumes every process in the container's process group.
///
/// # Errors
///
/// Returns an error if `SIGCONT` cannot be delivered.
pub fn resume(pgid: i32) -> Result<()> {
    send_group(pgid, Signal::SIGCONT)?;
    tracing::info!(pgid, "container resumed");
    Ok(())
}
