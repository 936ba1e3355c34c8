//! Linux namespace management for container isolation.
//!
//! The namespace set is created in one `clone(2)` call by
//! [`bootstrap`](crate::bootstrap::bootstrap); this module owns the mapping
//! from configuration to clone flags plus the per-namespace setup steps.

pub mod user;
pub mod uts;

/// Configuration for which namespaces a bootstrap creates.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamespaceConfig {
    /// Isolate PID namespace.
    pub pid: bool,
    /// Isolate mount namespace.
    pub mount: bool,
    /// Isolate network namespace.
    pub network: bool,
    /// Isolate user namespace.
    pub user: bool,
    /// Isolate IPC namespace.
    pub ipc: bool,
    /// Isolate UTS (hostname) namespace.
    pub uts: bool,
}

impl Default for NamespaceConfig {
    /// Everything but IPC, which stays shared with the host.
    fn default() -> Self {
        Self {
            pid: true,
            mount: true,
            network: true,
            user: true,
            ipc: false,
            uts: true,
        }
    }
}

#[cfg(target_os = "linux")]
impl NamespaceConfig {
    /// Clone flags selecting the configured namespaces.
    #[must_use]
    pub fn clone_flags(&self) -> nix::sched::CloneFlags {
        use nix::sched::CloneFlags;

        [
            (self.network, CloneFlags::CLONE_NEWNET),
            (self.uts, CloneFlags::CLONE_NEWUTS),
            (self.mount, CloneFlags::CLONE_NEWNS),
            (self.pid, CloneFlags::CLONE_NEWPID),
            (self.user, CloneFlags::CLONE_NEWUSER),
            (self.ipc, CloneFlags::CLONE_NEWIPC),
        ]
        .into_iter()
        .filter(|(enabled, _)| *enabled)
        .fold(CloneFlags::empty(), |acc, (_, flag)| acc | flag)
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use nix::sched::CloneFlags;

    use super::*;

    #[test]
    fn default_set_isolates_five_namespaces_and_shares_ipc() {
        let flags = NamespaceConfig::default().clone_flags();
        assert!(flags.contains(
            CloneFlags::CLONE_NEWNET
                | CloneFlags::CLONE_NEWUTS
                | CloneFlags::CLONE_NEWNS
                | CloneFlags::CLONE_NEWPID
                | CloneFlags::CLONE_NEWUSER
        ));
        assert!(!flags.contains(CloneFlags::CLONE_NEWIPC));
    }

    #[test]
    fn disabled_namespaces_are_left_out() {
        let config = NamespaceConfig {
            user: false,
            network: false,
            ..NamespaceConfig::default()
        };
        let flags = config.clone_flags();
        assert!(!flags.contains(CloneFlags::CLONE_NEWUSER));
        assert!(!flags.contains(CloneFlags::CLONE_NEWNET));
        assert!(flags.contains(CloneFlags::CLONE_NEWPID));
    }
}
