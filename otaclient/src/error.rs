//! Error types for the update client.
//!
//! Every component returns [`UpdateResult`]. The orchestrator turns the
//! error of a failed attempt into a terminal [`UpdateOutcome`] and uses
//! [`UpdateError::is_retryable`] to decide whether the run is retried.
//!
//! [`UpdateOutcome`]: crate::orchestrator::UpdateOutcome

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::eligibility::DenyReason;

/// Result type for update client operations.
pub type UpdateResult<T> = Result<T, UpdateError>;

/// Errors that can occur while checking for, downloading, verifying or
/// installing a firmware update.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// The transport could not complete the request.
    #[error("network error for {url}: {reason}")]
    Network { url: String, reason: String },

    /// The server answered with a status the client cannot use.
    #[error("unexpected status {status} from {url}")]
    Protocol { url: String, status: u16 },

    /// The server claimed an update but the descriptor is unusable.
    #[error("malformed server response: {0}")]
    MalformedResponse(String),

    /// The device does not satisfy the descriptor's constraints.
    #[error("device not eligible: {0}")]
    Ineligible(DenyReason),

    /// Reading or writing local storage failed.
    #[error("storage error at {}: {source}", path.display())]
    Storage { path: PathBuf, source: io::Error },

    /// The artifact grew beyond the configured ceiling.
    #[error("artifact exceeds maximum size of {limit} bytes (received {received})")]
    Oversize { limit: u64, received: u64 },

    /// The finished artifact does not have the advertised length.
    #[error("incomplete download: expected {expected} bytes, got {actual}")]
    IncompleteDownload { expected: u64, actual: u64 },

    /// The staged artifact's digest differs from the descriptor.
    #[error("digest mismatch: expected {expected}, got {actual}")]
    VerificationMismatch { expected: String, actual: String },

    /// The platform could not activate the artifact.
    #[error("install failed: {0}")]
    Install(String),

    /// The run was cancelled between download chunks.
    #[error("operation cancelled")]
    Cancelled,

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Another process holds the update lock on the storage directory.
    #[error("storage is locked by another update process ({})", .0.display())]
    Locked(PathBuf),
}

impl UpdateError {
    /// Create a storage error for the given path.
    pub fn storage(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// Create a network error for the given URL.
    pub fn network(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Network {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the orchestrator may retry the run after this error.
    ///
    /// Network failures and transient storage failures are retryable.
    /// Everything else is final for the current descriptor.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::Storage { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }

    /// Whether a partially staged artifact must be thrown away after this
    /// error rather than kept as a resume checkpoint.
    pub fn discards_partial(&self) -> bool {
        match self {
            Self::Oversize { .. } | Self::VerificationMismatch { .. } => true,
            Self::IncompleteDownload { expected, actual } => actual > expected,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_error_is_retryable() {
        let err = UpdateError::network("http://ota/check", "connection refused");
        assert!(err.is_retryable());
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_transient_storage_error_is_retryable() {
        let err = UpdateError::storage(
            "/tmp/artifact.part",
            io::Error::new(io::ErrorKind::Interrupted, "interrupted"),
        );
        assert!(err.is_retryable());

        let err = UpdateError::storage(
            "/tmp/artifact.part",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_final_errors_are_not_retryable() {
        assert!(!UpdateError::MalformedResponse("missing size".into()).is_retryable());
        assert!(!UpdateError::Protocol {
            url: "http://ota".into(),
            status: 500
        }
        .is_retryable());
        assert!(!UpdateError::Install("flash failed".into()).is_retryable());
        assert!(!UpdateError::Cancelled.is_retryable());
    }

    #[test]
    fn test_discards_partial() {
        assert!(UpdateError::Oversize {
            limit: 10,
            received: 11
        }
        .discards_partial());
        assert!(UpdateError::IncompleteDownload {
            expected: 10,
            actual: 12
        }
        .discards_partial());
        assert!(!UpdateError::IncompleteDownload {
            expected: 10,
            actual: 4
        }
        .discards_partial());
        assert!(!UpdateError::network("http://ota", "reset").discards_partial());
    }

    #[test]
    fn test_mismatch_display() {
        let err = UpdateError::VerificationMismatch {
            expected: "abc123".into(),
            actual: "def456".into(),
        };
        assert!(err.to_string().contains("abc123"));
        assert!(err.to_string().contains("def456"));
    }
}
