use std::path::PathBuf;
use thiserror::Error;

/// Errors raised before any probing starts.
///
/// Per-probe failures are never surfaced through this type; they are recorded
/// as [`ProbeState::Error`](crate::types::ProbeState::Error) outcomes instead.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("invalid target '{input}': {reason}")]
    InvalidTarget { input: String, reason: String },

    #[error("invalid port spec '{input}': {reason}")]
    InvalidPortSpec { input: String, reason: String },

    #[error("invalid concurrency limit: {value} (must be >= 1)")]
    InvalidConcurrency { value: usize },

    #[error("invalid timeout: must be greater than zero")]
    InvalidTimeout,

    #[error("failed to read spec file {}: {source}", path.display())]
    SpecFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ScanError {
    pub(crate) fn target(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTarget {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn ports(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPortSpec {
            input: input.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = ScanError> = std::result::Result<T, E>;
