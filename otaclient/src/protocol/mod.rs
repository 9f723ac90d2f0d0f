//! Wire format boundary between the client logic and the update server.
//!
//! The fetcher and reporter only deal with typed messages; a [`WireCodec`]
//! turns them into bytes and back. [`JsonCodec`] is the format spoken by
//! the update server.

mod json;

pub use json::JsonCodec;

use crate::descriptor::{CapabilitySnapshot, UpdateDescriptor};
use crate::error::UpdateResult;

/// Upper bound on the size of a check response body.
pub const MAX_CHECK_RESPONSE_BYTES: u64 = 64 * 1024;

/// Body of an update check request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRequest {
    pub device_id: String,
    pub current_version: String,
    pub capabilities: CapabilitySnapshot,
}

/// Status carried by an outcome or progress report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStatus {
    NoUpdate,
    Ineligible,
    CheckFailed,
    DownloadFailed,
    VerificationFailed,
    InstallFailed,
    Cancelled,
    Downloading,
    Success,
}

impl ReportStatus {
    /// Wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoUpdate => "no_update",
            Self::Ineligible => "ineligible",
            Self::CheckFailed => "check_failed",
            Self::DownloadFailed => "download_failed",
            Self::VerificationFailed => "verification_failed",
            Self::InstallFailed => "install_failed",
            Self::Cancelled => "cancelled",
            Self::Downloading => "downloading",
            Self::Success => "success",
        }
    }
}

/// A progress or outcome report sent to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeReport {
    pub device_id: String,
    pub campaign_id: Option<String>,
    pub status: ReportStatus,
    pub reason: Option<String>,
    pub version: Option<String>,
    /// Download progress in percent, for `Downloading` reports.
    pub progress: Option<u8>,
    /// 1-based attempt number within the run.
    pub attempt: u32,
    /// Whether this is the last report of the run.
    pub is_final: bool,
}

impl OutcomeReport {
    /// Create a report with no optional fields set.
    pub fn new(device_id: impl Into<String>, status: ReportStatus) -> Self {
        Self {
            device_id: device_id.into(),
            campaign_id: None,
            status,
            reason: None,
            version: None,
            progress: None,
            attempt: 1,
            is_final: true,
        }
    }
}

/// Encodes requests and decodes responses exchanged with the server.
pub trait WireCodec: Send + Sync {
    /// Content type of encoded bodies.
    fn content_type(&self) -> &'static str;

    /// Encode a check request.
    fn encode_check(&self, request: &CheckRequest) -> UpdateResult<Vec<u8>>;

    /// Decode a check response.
    ///
    /// Returns `Ok(None)` when the server reports no update.
    fn decode_check(&self, body: &[u8]) -> UpdateResult<Option<UpdateDescriptor>>;

    /// Encode a progress or outcome report.
    fn encode_report(&self, report: &OutcomeReport) -> UpdateResult<Vec<u8>>;
}
