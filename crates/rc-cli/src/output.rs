//! Formatted output helpers for CLI commands.
//!
//! Standard output belongs to the container, so everything the CLI itself
//! reports goes to standard error.

use rc_core::bootstrap::ExitReport;

/// Describes how a container process ended.
#[must_use]
pub fn describe_exit(subject: &str, report: ExitReport) -> String {
    match report {
        ExitReport::Exited(code) => format!("{subject} exited with status {code}"),
        ExitReport::Signaled(signal) => format!("{subject} killed by signal {signal}"),
    }
}

/// Writes a status line to standard error.
#[allow(clippy::print_stderr)]
pub fn status(line: &str) {
    eprintln!("{line}");
}
