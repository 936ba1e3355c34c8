//! Global configuration model for the rc runtime.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;

/// Root configuration for the rc runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Directory holding one sub-directory per container.
    pub root_dir: PathBuf,
    /// Hostname set inside every new UTS namespace.
    pub hostname: String,
    /// Bytes reserved for the isolated entry point's stack.
    pub stack_size: usize,
    /// Bounded wait on command channel reads, in milliseconds.
    pub channel_timeout_ms: u64,
    /// Grace period between SIGTERM and SIGKILL on stop, in milliseconds.
    pub stop_grace_ms: u64,
}

impl RuntimeConfig {
    /// Channel read timeout as a [`Duration`].
    #[must_use]
    pub const fn channel_timeout(&self) -> Duration {
        Duration::from_millis(self.channel_timeout_ms)
    }

    /// Stop grace period as a [`Duration`].
    #[must_use]
    pub const fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            root_dir: constants::runtime_root().clone(),
            hostname: constants::DEFAULT_HOSTNAME.to_owned(),
            stack_size: constants::DEFAULT_STACK_SIZE,
            channel_timeout_ms: constants::DEFAULT_CHANNEL_TIMEOUT_MS,
            stop_grace_ms: constants::DEFAULT_STOP_GRACE_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_fixed_hostname_and_one_mib_stack() {
        let config = RuntimeConfig::default();
        assert_eq!(config.hostname, "init");
        assert_eq!(config.stack_size, 1024 * 1024);
        assert_eq!(config.stop_grace(), Duration::from_secs(2));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: RuntimeConfig =
            serde_json::from_str(r#"{"hostname":"box","channel_timeout_ms":500}"#)
                .unwrap_or_default();
        assert_eq!(config.hostname, "box");
        assert_eq!(config.channel_timeout(), Duration::from_millis(500));
        assert_eq!(config.stack_size, constants::DEFAULT_STACK_SIZE);
    }
}
