//! Eligibility gate.
//!
//! Decides whether the device may proceed with an update given its current
//! state. The server already filters on the check request, but conditions
//! change between check, download and install, so the orchestrator
//! evaluates the gate again before each of those steps.

use std::fmt;

use semver::Version;

use crate::descriptor::{CapabilitySnapshot, UpdateDescriptor};

/// Device state the gate evaluates a descriptor against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceState {
    pub capabilities: CapabilitySnapshot,
    /// Version of the firmware currently active.
    pub current_version: String,
    /// Anti-rollback index recorded by the last activation.
    pub rollback_index: u32,
}

impl DeviceState {
    /// Count `bytes` already staged as free storage.
    ///
    /// Before install the artifact occupies staging space that the
    /// descriptor's size requirement would otherwise count twice.
    pub fn with_staged_bytes(mut self, bytes: u64) -> Self {
        self.capabilities.free_storage = self.capabilities.free_storage.saturating_add(bytes);
        self
    }
}

/// Why the gate refused an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    BatteryLow { level: u8, required: u8 },
    SignalWeak { strength: i32, required: i32 },
    InsufficientStorage { available: u64, required: u64 },
    /// The descriptor's anti-rollback value is below the device's index.
    RollbackFloor { floor: u32, device_index: u32 },
    /// The target version does not move the device forward.
    NotNewer { current: String, target: String },
    /// A version could not be parsed, so ordering is unknown.
    UnorderableVersion { version: String },
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BatteryLow { level, required } => {
                write!(f, "battery at {}%, need {}%", level, required)
            }
            Self::SignalWeak { strength, required } => {
                write!(f, "signal {} below required {}", strength, required)
            }
            Self::InsufficientStorage {
                available,
                required,
            } => write!(
                f,
                "{} bytes free, need {} bytes",
                available, required
            ),
            Self::RollbackFloor {
                floor,
                device_index,
            } => write!(
                f,
                "anti-rollback value {} is below device index {}",
                floor, device_index
            ),
            Self::NotNewer { current, target } => {
                write!(f, "version {} is not newer than {}", target, current)
            }
            Self::UnorderableVersion { version } => {
                write!(f, "cannot order version '{}'", version)
            }
        }
    }
}

/// Result of evaluating the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Allow,
    Deny(DenyReason),
}

impl Eligibility {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Parse a firmware version, accepting an optional leading `v`.
pub fn parse_version(version: &str) -> Option<Version> {
    let trimmed = version.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    Version::parse(trimmed).ok()
}

/// Stateless eligibility gate.
#[derive(Debug, Clone, Copy, Default)]
pub struct EligibilityGate;

impl EligibilityGate {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate `descriptor` against `device`.
    ///
    /// Checks run in a fixed order (battery, signal, storage, rollback) and
    /// the first failing check is reported.
    pub fn evaluate(&self, descriptor: &UpdateDescriptor, device: &DeviceState) -> Eligibility {
        let caps = &device.capabilities;

        if caps.battery_percent < descriptor.min_battery {
            return Eligibility::Deny(DenyReason::BatteryLow {
                level: caps.battery_percent,
                required: descriptor.min_battery,
            });
        }

        if caps.signal_strength < descriptor.min_signal {
            return Eligibility::Deny(DenyReason::SignalWeak {
                strength: caps.signal_strength,
                required: descriptor.min_signal,
            });
        }

        if caps.free_storage < descriptor.size {
            return Eligibility::Deny(DenyReason::InsufficientStorage {
                available: caps.free_storage,
                required: descriptor.size,
            });
        }

        if let Some(floor) = descriptor.anti_rollback {
            if let Some(reason) = Self::check_rollback(floor, descriptor, device) {
                return Eligibility::Deny(reason);
            }
        }

        Eligibility::Allow
    }

    fn check_rollback(
        floor: u32,
        descriptor: &UpdateDescriptor,
        device: &DeviceState,
    ) -> Option<DenyReason> {
        if floor < device.rollback_index {
            return Some(DenyReason::RollbackFloor {
                floor,
                device_index: device.rollback_index,
            });
        }

        let Some(current) = parse_version(&device.current_version) else {
            return Some(DenyReason::UnorderableVersion {
                version: device.current_version.clone(),
            });
        };
        let Some(target) = parse_version(&descriptor.version) else {
            return Some(DenyReason::UnorderableVersion {
                version: descriptor.version.clone(),
            });
        };

        if target <= current {
            return Some(DenyReason::NotNewer {
                current: device.current_version.clone(),
                target: descriptor.version.clone(),
            });
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> UpdateDescriptor {
        UpdateDescriptor {
            firmware_id: "sensor-fw".into(),
            version: "1.3.0".into(),
            campaign_id: "spring".into(),
            size: 1024,
            digest: "0".repeat(64),
            download_uri: "http://ota/fw.bin".into(),
            min_battery: 30,
            min_signal: -85,
            anti_rollback: None,
            mtu: None,
        }
    }

    fn device() -> DeviceState {
        DeviceState {
            capabilities: CapabilitySnapshot {
                battery_percent: 80,
                signal_strength: -60,
                free_storage: 1 << 20,
            },
            current_version: "1.2.0".into(),
            rollback_index: 3,
        }
    }

    #[test]
    fn test_allows_eligible_device() {
        assert_eq!(
            EligibilityGate::new().evaluate(&descriptor(), &device()),
            Eligibility::Allow
        );
    }

    #[test]
    fn test_denies_low_battery() {
        let mut state = device();
        state.capabilities.battery_percent = 29;

        assert_eq!(
            EligibilityGate::new().evaluate(&descriptor(), &state),
            Eligibility::Deny(DenyReason::BatteryLow {
                level: 29,
                required: 30
            })
        );
    }

    #[test]
    fn test_battery_at_threshold_is_allowed() {
        let mut state = device();
        state.capabilities.battery_percent = 30;
        assert!(EligibilityGate::new().evaluate(&descriptor(), &state).is_allowed());
    }

    #[test]
    fn test_denies_weak_signal() {
        let mut state = device();
        state.capabilities.signal_strength = -95;

        assert!(matches!(
            EligibilityGate::new().evaluate(&descriptor(), &state),
            Eligibility::Deny(DenyReason::SignalWeak { .. })
        ));
    }

    #[test]
    fn test_denies_insufficient_storage() {
        let mut state = device();
        state.capabilities.free_storage = 1023;

        assert_eq!(
            EligibilityGate::new().evaluate(&descriptor(), &state),
            Eligibility::Deny(DenyReason::InsufficientStorage {
                available: 1023,
                required: 1024
            })
        );
    }

    #[test]
    fn test_staged_bytes_count_as_free() {
        let mut state = device();
        state.capabilities.free_storage = 24;

        let state = state.with_staged_bytes(1000);
        assert!(EligibilityGate::new().evaluate(&descriptor(), &state).is_allowed());
    }

    #[test]
    fn test_denies_rollback_below_device_index() {
        let mut desc = descriptor();
        desc.anti_rollback = Some(2);

        assert_eq!(
            EligibilityGate::new().evaluate(&desc, &device()),
            Eligibility::Deny(DenyReason::RollbackFloor {
                floor: 2,
                device_index: 3
            })
        );
    }

    #[test]
    fn test_denies_same_version_under_anti_rollback() {
        let mut desc = descriptor();
        desc.anti_rollback = Some(3);
        desc.version = "1.2.0".into();

        assert!(matches!(
            EligibilityGate::new().evaluate(&desc, &device()),
            Eligibility::Deny(DenyReason::NotNewer { .. })
        ));
    }

    #[test]
    fn test_denies_older_version_under_anti_rollback() {
        let mut desc = descriptor();
        desc.anti_rollback = Some(5);
        desc.version = "v1.1.9".into();

        assert!(matches!(
            EligibilityGate::new().evaluate(&desc, &device()),
            Eligibility::Deny(DenyReason::NotNewer { .. })
        ));
    }

    #[test]
    fn test_allows_newer_version_under_anti_rollback() {
        let mut desc = descriptor();
        desc.anti_rollback = Some(3);
        assert!(EligibilityGate::new().evaluate(&desc, &device()).is_allowed());
    }

    #[test]
    fn test_unparseable_version_denied_under_anti_rollback() {
        let mut desc = descriptor();
        desc.anti_rollback = Some(3);
        desc.version = "nightly-42".into();

        assert_eq!(
            EligibilityGate::new().evaluate(&desc, &device()),
            Eligibility::Deny(DenyReason::UnorderableVersion {
                version: "nightly-42".into()
            })
        );
    }

    #[test]
    fn test_same_version_allowed_without_anti_rollback() {
        let mut desc = descriptor();
        desc.version = "1.2.0".into();
        assert!(EligibilityGate::new().evaluate(&desc, &device()).is_allowed());
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("v2.0.1"), Some(Version::new(2, 0, 1)));
        assert_eq!(parse_version(" 1.0.0 "), Some(Version::new(1, 0, 0)));
        assert_eq!(parse_version("1.0"), None);
    }

    #[test]
    fn test_deny_reason_display() {
        let reason = DenyReason::BatteryLow {
            level: 10,
            required: 30,
        };
        assert_eq!(reason.to_string(), "battery at 10%, need 30%");
    }
}
