//! Error types shared by the virtfleet crates.

use std::time::Duration;

use thiserror::Error;

/// Result type used across the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the fleet and benchmark pipelines.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(String),

    /// Malformed input (auth descriptor, resource definition); raised before
    /// any remote action.
    #[error("validation error: {message}")]
    Validation {
        /// Description of what's invalid
        message: String,
    },

    /// A control-plane or transport command could not be executed or
    /// returned a failure.
    #[error("command failed: {message}")]
    CommandFailed {
        /// Description of what failed
        message: String,
    },

    /// A bounded wait did not reach its goal in time.
    #[error("timed out after {}s waiting for {what}", .waited.as_secs())]
    WaitTimeout {
        /// What the wait was for (e.g. "VMs ready")
        what: String,
        /// The configured bound
        waited: Duration,
    },

    /// A fan-out step failed on at least one host, aborting the sequence.
    #[error("step '{step}' failed on {host}: {detail}")]
    StepFailed {
        /// The step that failed
        step: String,
        /// First host that returned a non-zero exit
        host: String,
        /// Captured stderr or transport error
        detail: String,
    },

    /// The benchmark payload failed on part of the host set; the per-host
    /// details are in the error report.
    #[error("{failed} host(s) failed the benchmark payload")]
    HostsFailed {
        /// Number of hosts in the error bucket
        failed: usize,
    },
}

impl Error {
    /// Create a validation error with the given message.
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    /// Create a command execution error with the given message.
    pub fn command_failed(message: impl Into<String>) -> Self {
        Error::CommandFailed {
            message: message.into(),
        }
    }

    /// Create a timeout error for a bounded wait.
    pub fn wait_timeout(what: impl Into<String>, waited: Duration) -> Self {
        Error::WaitTimeout {
            what: what.into(),
            waited,
        }
    }

    /// Create a fan-out step failure.
    pub fn step_failed(
        step: impl Into<String>,
        host: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Error::StepFailed {
            step: step.into(),
            host: host.into(),
            detail: detail.into(),
        }
    }

    /// Process exit status for this error.
    ///
    /// Readiness timeouts exit 1; an aggregated benchmark failure exits 2 so
    /// callers can tell "the fleet never came up" from "some hosts failed
    /// the payload".
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::WaitTimeout { .. } => 1,
            Error::HostsFailed { .. } => 2,
            _ => 1,
        }
    }
}
