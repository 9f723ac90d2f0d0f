//! Run outcome and orchestrator state.

use std::fmt;

use crate::eligibility::DenyReason;
use crate::protocol::ReportStatus;

/// Step the orchestrator is currently in.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OrchestratorState {
    #[default]
    Idle,
    Checking,
    Evaluating,
    Downloading,
    Verifying,
    Installing,
    Reporting,
    /// The current attempt failed with the given reason.
    Failed(String),
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Checking => write!(f, "checking"),
            Self::Evaluating => write!(f, "evaluating"),
            Self::Downloading => write!(f, "downloading"),
            Self::Verifying => write!(f, "verifying"),
            Self::Installing => write!(f, "installing"),
            Self::Reporting => write!(f, "reporting"),
            Self::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Terminal result of one orchestration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The server has nothing for this device.
    NoUpdate,
    /// The eligibility gate refused the update.
    Ineligible(DenyReason),
    /// The update check itself failed.
    CheckFailed(String),
    DownloadFailed(String),
    /// The staged artifact did not match the advertised digest.
    VerificationFailed,
    /// Activation failed; the previous firmware is still active.
    InstallFailed(String),
    /// The run was cancelled before completion.
    Cancelled,
    Success { new_version: String },
}

impl UpdateOutcome {
    /// Whether the run left the device on new firmware.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Whether the run ended without error (success or nothing to do).
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Success { .. } | Self::NoUpdate)
    }

    /// Status sent to the server for this outcome.
    pub fn report_status(&self) -> ReportStatus {
        match self {
            Self::NoUpdate => ReportStatus::NoUpdate,
            Self::Ineligible(_) => ReportStatus::Ineligible,
            Self::CheckFailed(_) => ReportStatus::CheckFailed,
            Self::DownloadFailed(_) => ReportStatus::DownloadFailed,
            Self::VerificationFailed => ReportStatus::VerificationFailed,
            Self::InstallFailed(_) => ReportStatus::InstallFailed,
            Self::Cancelled => ReportStatus::Cancelled,
            Self::Success { .. } => ReportStatus::Success,
        }
    }

    /// Human readable failure reason, if the outcome is a failure.
    pub fn reason(&self) -> Option<String> {
        match self {
            Self::Ineligible(reason) => Some(reason.to_string()),
            Self::CheckFailed(reason)
            | Self::DownloadFailed(reason)
            | Self::InstallFailed(reason) => Some(reason.clone()),
            Self::VerificationFailed => Some("digest mismatch".to_string()),
            Self::Cancelled => Some("cancelled".to_string()),
            Self::NoUpdate | Self::Success { .. } => None,
        }
    }
}

impl fmt::Display for UpdateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoUpdate => write!(f, "no update available"),
            Self::Ineligible(reason) => write!(f, "ineligible: {}", reason),
            Self::CheckFailed(reason) => write!(f, "check failed: {}", reason),
            Self::DownloadFailed(reason) => write!(f, "download failed: {}", reason),
            Self::VerificationFailed => write!(f, "verification failed: digest mismatch"),
            Self::InstallFailed(reason) => write!(f, "install failed: {}", reason),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Success { new_version } => write!(f, "updated to {}", new_version),
        }
    }
}
