//! Client configuration.
//!
//! In-code configuration uses builder-style structs with sensible
//! defaults. [`ConfigFile`] loads the same settings from an INI file.

mod file;

pub use file::{
    default_config_path, CapabilitiesSection, ConfigFile, DeviceSection, ScheduleSection,
    ServerSection, StorageSection,
};

use std::time::Duration;

use crate::orchestrator::RetryPolicy;

/// Default read buffer for artifact downloads (4KB).
pub const DEFAULT_BUFFER_SIZE: usize = 4 * 1024;

/// Default ceiling on artifact size (16MB).
pub const DEFAULT_MAX_ARTIFACT_SIZE: u64 = 16 * 1024 * 1024;

/// Default HTTP timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default progress reporting granularity in percent.
pub const DEFAULT_PROGRESS_STEP: u8 = 10;

/// Download settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadConfig {
    /// Size of each read from the response body.
    pub buffer_size: usize,
    /// Hard ceiling on staged bytes, independent of the descriptor.
    pub max_artifact_size: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_artifact_size: DEFAULT_MAX_ARTIFACT_SIZE,
        }
    }
}

impl DownloadConfig {
    /// Set the read buffer size (minimum 1 byte).
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(1);
        self
    }

    /// Set the artifact size ceiling.
    pub fn with_max_artifact_size(mut self, size: u64) -> Self {
        self.max_artifact_size = size;
        self
    }
}

/// Settings needed to build an orchestrator.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Identifier the server knows this device by.
    pub device_id: String,
    /// Endpoint for update checks.
    pub check_url: String,
    /// Endpoint for progress and outcome reports. Reporting is off when unset.
    pub report_url: Option<String>,
    /// HTTP request timeout.
    pub timeout: Duration,
    pub download: DownloadConfig,
    pub retry: RetryPolicy,
    /// Send a progress report every this many percent.
    pub progress_step: u8,
}

impl ClientConfig {
    pub fn new(device_id: impl Into<String>, check_url: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            check_url: check_url.into(),
            report_url: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            download: DownloadConfig::default(),
            retry: RetryPolicy::default(),
            progress_step: DEFAULT_PROGRESS_STEP,
        }
    }

    /// Set the report endpoint.
    pub fn with_report_url(mut self, url: impl Into<String>) -> Self {
        self.report_url = Some(url.into());
        self
    }

    /// Set the HTTP timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the download settings.
    pub fn with_download(mut self, download: DownloadConfig) -> Self {
        self.download = download;
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the progress reporting granularity (1-100 percent).
    pub fn with_progress_step(mut self, step: u8) -> Self {
        self.progress_step = step.clamp(1, 100);
        self
    }
}
