//! CLI error types.

use std::fmt;

use otaclient::UpdateError;

/// Errors surfaced to the user by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// Configuration could not be loaded or is incomplete.
    Config(String),
    /// A library operation failed.
    Update(UpdateError),
    /// The async runtime could not be started.
    Runtime(String),
    /// An update run finished without installing or confirming firmware.
    RunFailed(String),
    /// Another update run holds the orchestrator.
    Busy,
    /// A file's digest does not match the expected one.
    DigestMismatch { expected: String, actual: String },
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Update(e) => write!(f, "{}", e),
            CliError::Runtime(msg) => write!(f, "Failed to start runtime: {}", msg),
            CliError::RunFailed(outcome) => write!(f, "Update run failed: {}", outcome),
            CliError::Busy => write!(f, "Another update run is already in progress"),
            CliError::DigestMismatch { expected, actual } => {
                write!(f, "Digest mismatch: expected {}, got {}", expected, actual)
            }
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Update(e) => Some(e),
            _ => None,
        }
    }
}

impl From<UpdateError> for CliError {
    fn from(e: UpdateError) -> Self {
        match e {
            UpdateError::Config(msg) => CliError::Config(msg),
            UpdateError::Locked(_) => CliError::Busy,
            other => CliError::Update(other),
        }
    }
}
