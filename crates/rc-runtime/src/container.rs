//! Per-container runtime directory and phase observation.

use std::fs::File;
use std::io::ErrorKind;
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rc_common::constants::{CONTROL_SOCKET, STATE_FILE};
use rc_common::error::{RcError, Result};
use rc_common::types::ContainerName;

use crate::channel::ChannelClient;
use crate::lifecycle::Phase;
use crate::process;
use crate::state::{self, StateEntry};

/// What a controller can observe about a container.
#[derive(Debug)]
pub enum Observation {
    /// No directory by this name.
    Absent,
    /// A directory left behind by a container that no longer exists: its
    /// record names a dead or reused PID, or it has no record and nothing
    /// listens on its socket.
    Stale,
    /// A supervisor is waiting for START; the connection is open.
    Pending {
        /// The container's state record, not yet written while its creating
        /// controller is still preparing the supervisor.
        entry: Option<StateEntry>,
        /// Connection to the supervisor.
        client: ChannelClient,
    },
    /// The supervisor has been replaced by the container command.
    Running {
        /// The container's state record.
        entry: StateEntry,
    },
}

impl Observation {
    /// Lifecycle phase matching this observation.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        match self {
            Self::Absent | Self::Stale => Phase::NoInit,
            Self::Pending { .. } => Phase::InitPending,
            Self::Running { .. } => Phase::Running,
        }
    }
}

/// Exclusive hold on a container name while it is being created.
///
/// Released on drop, or by the kernel if the holder dies.
pub struct CreateLock {
    _lock: nix::fcntl::Flock<File>,
}

impl std::fmt::Debug for CreateLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreateLock").finish_non_exhaustive()
    }
}

/// Runtime directory `<root>/<name>/` of one container.
#[derive(Debug, Clone)]
pub struct ContainerDir {
    name: ContainerName,
    path: PathBuf,
}

impl ContainerDir {
    /// Directory for `name` under `root`.
    #[must_use]
    pub fn new(root: &Path, name: ContainerName) -> Self {
        let path = root.join(name.as_str());
        Self { name, path }
    }

    /// Container name.
    #[must_use]
    pub const fn name(&self) -> &ContainerName {
        &self.name
    }

    /// Directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the supervisor's control socket.
    #[must_use]
    pub fn socket_path(&self) -> PathBuf {
        self.path.join(CONTROL_SOCKET)
    }

    /// Path of the state record.
    #[must_use]
    pub fn state_path(&self) -> PathBuf {
        self.path.join(STATE_FILE)
    }

    /// Path of the lock file serializing creates of this name. It sits next
    /// to the directory; names never start with a dot, so it cannot clash.
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.path.with_file_name(format!(".{}.lock", self.name))
    }

    /// Blocks until no other controller is creating a container by this
    /// name, then holds the name until the returned lock is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock file cannot be opened or locked.
    pub fn lock(&self) -> Result<CreateLock> {
        use nix::fcntl::{Flock, FlockArg};

        let path = self.lock_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RcError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let file = File::options()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| RcError::Io {
                path: path.clone(),
                source: e,
            })?;
        let lock = Flock::lock(file, FlockArg::LockExclusive).map_err(|(_, errno)| {
            RcError::Io {
                path,
                source: errno.into(),
            }
        })?;
        Ok(CreateLock { _lock: lock })
    }

    /// Loads the state record, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the record exists but cannot be read.
    pub fn load(&self) -> Result<Option<StateEntry>> {
        state::load_state(&self.state_path())
    }

    /// Writes the state record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be written.
    pub fn save(&self, entry: &StateEntry) -> Result<()> {
        state::save_state(&self.state_path(), entry)
    }

    /// Creates the directory and binds the control socket.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory already exists or the socket
    /// cannot be bound.
    pub fn prepare(&self) -> Result<UnixListener> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RcError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        std::fs::create_dir(&self.path).map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => RcError::DuplicateInit,
            _ => RcError::Io {
                path: self.path.clone(),
                source: e,
            },
        })?;
        let socket = self.socket_path();
        let listener = UnixListener::bind(&socket).map_err(|e| RcError::Io {
            path: socket,
            source: e,
        })?;
        tracing::debug!(path = %self.path.display(), "container directory prepared");
        Ok(listener)
    }

    /// Removes the directory and everything in it; a missing directory is fine.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be removed.
    pub fn remove(&self) -> Result<()> {
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "container directory removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RcError::Io {
                path: self.path.clone(),
                source: e,
            }),
        }
    }

    /// Observes the container's phase.
    ///
    /// A live process whose socket accepts connections is a waiting
    /// supervisor; one whose socket refuses them has replaced its image.
    /// The recorded PID only counts as alive if its start time matches.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is unreadable or connecting fails
    /// for a reason other than a missing or abandoned socket.
    pub fn observe(&self, timeout: Duration) -> Result<Observation> {
        let entry = self.load()?;
        match &entry {
            Some(entry) if !process::is_same_process(entry.pid, entry.start_time) => {
                tracing::debug!(name = %self.name, pid = entry.pid, "stale container record");
                return Ok(Observation::Stale);
            }
            None if !self.path.exists() => return Ok(Observation::Absent),
            _ => {}
        }
        match ChannelClient::connect(&self.socket_path(), timeout) {
            Ok(client) => Ok(Observation::Pending { entry, client }),
            Err(e) if matches!(e.kind(), ErrorKind::ConnectionRefused | ErrorKind::NotFound) => {
                Ok(entry.map_or(Observation::Stale, |entry| Observation::Running { entry }))
            }
            Err(e) => Err(RcError::Io {
                path: self.socket_path(),
                source: e,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use rc_common::types::CommandLine;

    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn dir_in(root: &Path) -> ContainerDir {
        ContainerDir::new(root, ContainerName::new("c1").expect("name"))
    }

    fn record(pid: i32) -> StateEntry {
        StateEntry::new(
            ContainerName::new("c1").expect("name"),
            pid,
            process::start_time(pid).unwrap_or_default(),
            CommandLine::new(vec!["/bin/sleep".into(), "1".into()]),
            "init".into(),
        )
    }

    fn own_pid() -> i32 {
        i32::try_from(std::process::id()).expect("pid fits")
    }

    #[test]
    fn missing_directory_is_absent() {
        let root = tempfile::tempdir().expect("tempdir");
        let observed = dir_in(root.path()).observe(TIMEOUT).expect("observe");
        assert_eq!(observed.phase(), Phase::NoInit);
    }

    #[test]
    fn dead_pid_is_stale() {
        let root = tempfile::tempdir().expect("tempdir");
        let dir = dir_in(root.path());
        let _listener = dir.prepare().expect("prepare");
        dir.save(&record(i32::MAX)).expect("save");
        assert!(matches!(dir.observe(TIMEOUT).expect("observe"), Observation::Stale));
    }

    #[test]
    fn reused_pid_is_stale() {
        let root = tempfile::tempdir().expect("tempdir");
        let dir = dir_in(root.path());
        drop(dir.prepare().expect("prepare"));
        let mut entry = record(own_pid());
        entry.start_time += 1;
        dir.save(&entry).expect("save");
        assert!(matches!(dir.observe(TIMEOUT).expect("observe"), Observation::Stale));
    }

    #[test]
    fn unrecorded_directory_with_listener_is_pending() {
        let root = tempfile::tempdir().expect("tempdir");
        let dir = dir_in(root.path());
        let _listener = dir.prepare().expect("prepare");
        let observed = dir.observe(TIMEOUT).expect("observe");
        assert!(matches!(observed, Observation::Pending { entry: None, .. }));
        assert!(dir.socket_path().exists());
    }

    #[test]
    fn unrecorded_directory_without_listener_is_stale() {
        let root = tempfile::tempdir().expect("tempdir");
        let dir = dir_in(root.path());
        drop(dir.prepare().expect("prepare"));
        assert!(matches!(dir.observe(TIMEOUT).expect("observe"), Observation::Stale));
    }

    #[test]
    fn create_lock_is_exclusive_per_name() {
        let root = tempfile::tempdir().expect("tempdir");
        let dir = dir_in(root.path());
        let held = dir.lock().expect("lock");

        let contender = dir.clone();
        let (tx, rx) = std::sync::mpsc::channel();
        let waiter = std::thread::spawn(move || {
            let lock = contender.lock().expect("second lock");
            tx.send(()).expect("send");
            drop(lock);
        });
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
        drop(held);
        rx.recv_timeout(Duration::from_secs(5)).expect("lock handed over");
        waiter.join().expect("waiter");
        assert!(!dir.path().exists());
    }

    #[test]
    fn listening_socket_means_pending() {
        let root = tempfile::tempdir().expect("tempdir");
        let dir = dir_in(root.path());
        let _listener = dir.prepare().expect("prepare");
        dir.save(&record(own_pid())).expect("save");
        assert_eq!(
            dir.observe(TIMEOUT).expect("observe").phase(),
            Phase::InitPending
        );
    }

    #[test]
    fn closed_socket_means_running() {
        let root = tempfile::tempdir().expect("tempdir");
        let dir = dir_in(root.path());
        drop(dir.prepare().expect("prepare"));
        dir.save(&record(own_pid())).expect("save");
        assert_eq!(dir.observe(TIMEOUT).expect("observe").phase(), Phase::Running);
    }

    #[test]
    fn prepare_refuses_existing_directory_and_remove_cleans_up() {
        let root = tempfile::tempdir().expect("tempdir");
        let dir = dir_in(root.path());
        let _listener = dir.prepare().expect("prepare");
        assert!(matches!(dir.prepare(), Err(RcError::DuplicateInit)));
        dir.remove().expect("remove");
        assert!(!dir.path().exists());
        dir.remove().expect("second remove is a no-op");
    }
}
