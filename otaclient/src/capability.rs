//! Device capability readings.
//!
//! The client reads battery, signal and free storage through the
//! [`CapabilityProvider`] trait. Readings are taken fresh for every check
//! and again before download and install, since they change over time.

use std::ffi::CString;
use std::fs;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::descriptor::CapabilitySnapshot;
use crate::error::{UpdateError, UpdateResult};

/// Read-only view of the device's battery, radio and storage state.
pub trait CapabilityProvider: Send + Sync {
    /// Battery charge in percent (0-100).
    fn battery_percent(&self) -> UpdateResult<u8>;

    /// Signal strength in device-defined units.
    fn signal_strength(&self) -> UpdateResult<i32>;

    /// Free bytes available for staging an artifact.
    fn free_storage(&self) -> UpdateResult<u64>;

    /// Take all three readings at once.
    fn snapshot(&self) -> UpdateResult<CapabilitySnapshot> {
        Ok(CapabilitySnapshot {
            battery_percent: self.battery_percent()?,
            signal_strength: self.signal_strength()?,
            free_storage: self.free_storage()?,
        })
    }
}

/// Provider returning fixed readings.
///
/// Used for mains-powered devices and in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticCapabilities {
    snapshot: CapabilitySnapshot,
}

impl StaticCapabilities {
    pub fn new(battery_percent: u8, signal_strength: i32, free_storage: u64) -> Self {
        Self {
            snapshot: CapabilitySnapshot {
                battery_percent,
                signal_strength,
                free_storage,
            },
        }
    }
}

impl From<CapabilitySnapshot> for StaticCapabilities {
    fn from(snapshot: CapabilitySnapshot) -> Self {
        Self { snapshot }
    }
}

impl CapabilityProvider for StaticCapabilities {
    fn battery_percent(&self) -> UpdateResult<u8> {
        Ok(self.snapshot.battery_percent)
    }

    fn signal_strength(&self) -> UpdateResult<i32> {
        Ok(self.snapshot.signal_strength)
    }

    fn free_storage(&self) -> UpdateResult<u64> {
        Ok(self.snapshot.free_storage)
    }
}

/// Provider reading the host system.
///
/// - Battery comes from a sysfs `capacity` file; without one the device is
///   treated as mains powered (100%).
/// - Signal comes from a configured value, as Linux has no single source
///   for it.
/// - Free storage is measured with `statvfs` on the staging directory.
#[derive(Debug, Clone)]
pub struct HostCapabilities {
    battery_path: Option<PathBuf>,
    signal_strength: i32,
    staging_dir: PathBuf,
}

impl HostCapabilities {
    pub fn new(staging_dir: impl Into<PathBuf>, signal_strength: i32) -> Self {
        Self {
            battery_path: None,
            signal_strength,
            staging_dir: staging_dir.into(),
        }
    }

    /// Read the battery level from `path` (e.g. `/sys/class/power_supply/BAT0/capacity`).
    pub fn with_battery_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.battery_path = Some(path.into());
        self
    }
}

impl CapabilityProvider for HostCapabilities {
    fn battery_percent(&self) -> UpdateResult<u8> {
        let Some(path) = &self.battery_path else {
            return Ok(100);
        };

        let raw = fs::read_to_string(path).map_err(|e| UpdateError::storage(path, e))?;
        let value: u32 = raw.trim().parse().map_err(|_| {
            UpdateError::storage(
                path,
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("not a battery level: '{}'", raw.trim()),
                ),
            )
        })?;
        Ok(value.min(100) as u8)
    }

    fn signal_strength(&self) -> UpdateResult<i32> {
        Ok(self.signal_strength)
    }

    fn free_storage(&self) -> UpdateResult<u64> {
        let free = available_bytes(&self.staging_dir)
            .map_err(|e| UpdateError::storage(&self.staging_dir, e))?;
        debug!(path = %self.staging_dir.display(), free, "Measured free storage");
        Ok(free)
    }
}

/// Bytes available to unprivileged users on the filesystem holding `path`.
fn available_bytes(path: &Path) -> io::Result<u64> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let mut stats: libc::statvfs = unsafe { std::mem::zeroed() };
    // SAFETY: `c_path` is a valid NUL-terminated string and `stats` is a
    // properly sized out-parameter.
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stats) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }

    Ok((stats.f_bavail as u64).saturating_mul(stats.f_frsize as u64))
}
