//! Update descriptor and capability snapshot types.
//!
//! These are the immutable records exchanged with the update server. The
//! descriptor is built once per check cycle and owned by the orchestrator
//! for the duration of a run.

use std::fmt;

/// Maximum length of the textual identifiers in a descriptor.
pub const MAX_IDENTIFIER_LEN: usize = 128;

/// Length of a hex-encoded SHA-256 digest.
pub const DIGEST_HEX_LEN: usize = 64;

/// An available firmware update as described by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateDescriptor {
    /// Identifier of the firmware image.
    pub firmware_id: String,
    /// Version the device will run after installing.
    pub version: String,
    /// Rollout campaign this update belongs to.
    pub campaign_id: String,
    /// Expected artifact length in bytes.
    pub size: u64,
    /// Expected SHA-256 digest, lowercase hex.
    pub digest: String,
    /// Where to fetch the artifact from.
    pub download_uri: String,
    /// Minimum battery level required to proceed.
    pub min_battery: u8,
    /// Minimum signal strength required to proceed.
    pub min_signal: i32,
    /// Anti-rollback floor, if the server enforces one.
    pub anti_rollback: Option<u32>,
    /// Suggested transfer chunk size. Advisory only.
    pub mtu: Option<u32>,
}

impl fmt::Display for UpdateDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} v{} ({} bytes, campaign {})",
            self.firmware_id, self.version, self.size, self.campaign_id
        )
    }
}

/// Point-in-time reading of the device's capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CapabilitySnapshot {
    /// Battery charge in percent.
    pub battery_percent: u8,
    /// Radio signal strength in device-defined units.
    pub signal_strength: i32,
    /// Free staging storage in bytes.
    pub free_storage: u64,
}

/// Check whether `digest` is a 64-character hex string (any case).
pub fn is_valid_digest(digest: &str) -> bool {
    digest.len() == DIGEST_HEX_LEN && digest.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Normalize a digest to lowercase hex, or `None` if it is not one.
pub fn normalize_digest(digest: &str) -> Option<String> {
    is_valid_digest(digest).then(|| digest.to_ascii_lowercase())
}
