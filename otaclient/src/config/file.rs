//! INI configuration file.
//!
//! ```ini
//! [device]
//! id = sensor-0042
//!
//! [server]
//! check_url = https://ota.example.com/api/v1/check
//! report_url = https://ota.example.com/api/v1/report
//! timeout = 30
//!
//! [download]
//! buffer_size = 4096
//! max_artifact_size = 16777216
//!
//! [retry]
//! max_attempts = 3
//! delay_secs = 10
//! backoff = fixed
//!
//! [schedule]
//! interval_secs = 3600
//!
//! [storage]
//! directory = /var/lib/otaclient
//! factory_version = 1.0.0
//!
//! [capabilities]
//! battery_path = /sys/class/power_supply/BAT0/capacity
//! signal_override = -60
//!
//! [logging]
//! level = info
//! directory = /var/log/otaclient
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;

use super::{ClientConfig, DownloadConfig, DEFAULT_PROGRESS_STEP, DEFAULT_TIMEOUT_SECS};
use crate::error::{UpdateError, UpdateResult};
use crate::logging::LoggingConfig;
use crate::orchestrator::{RetryPolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY_SECS};

/// Default interval between scheduled update checks.
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 3600;

/// Default signal strength reported when none is configured.
pub const DEFAULT_SIGNAL: i32 = 0;

/// `[device]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceSection {
    pub id: Option<String>,
}

/// `[server]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSection {
    pub check_url: Option<String>,
    pub report_url: Option<String>,
    /// Request timeout in seconds.
    pub timeout: u64,
    /// Progress report granularity in percent.
    pub progress_step: u8,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            check_url: None,
            report_url: None,
            timeout: DEFAULT_TIMEOUT_SECS,
            progress_step: DEFAULT_PROGRESS_STEP,
        }
    }
}

/// `[schedule]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleSection {
    pub interval: Duration,
}

impl Default for ScheduleSection {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_CHECK_INTERVAL_SECS),
        }
    }
}

/// `[storage]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageSection {
    pub directory: PathBuf,
    /// Version reported before the first activation.
    pub factory_version: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            directory: dirs::data_local_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("otaclient"),
            factory_version: crate::storage::DEFAULT_FACTORY_VERSION.to_string(),
        }
    }
}

/// `[capabilities]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilitiesSection {
    pub battery_path: Option<PathBuf>,
    pub signal: i32,
}

impl Default for CapabilitiesSection {
    fn default() -> Self {
        Self {
            battery_path: None,
            signal: DEFAULT_SIGNAL,
        }
    }
}

/// Parsed configuration file.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    pub device: DeviceSection,
    pub server: ServerSection,
    pub download: DownloadConfig,
    pub retry: RetryPolicy,
    pub schedule: ScheduleSection,
    pub storage: StorageSection,
    pub capabilities: CapabilitiesSection,
    pub logging: LoggingConfig,
}

/// Default location of the configuration file.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("otaclient")
        .join("config.ini")
}

fn get<'a>(ini: &'a Ini, section: &str, key: &str) -> Option<&'a str> {
    ini.section(Some(section))
        .and_then(|s| s.get(key))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn parse<T: FromStr>(ini: &Ini, section: &str, key: &str) -> UpdateResult<Option<T>> {
    match get(ini, section, key) {
        None => Ok(None),
        Some(raw) => raw.parse::<T>().map(Some).map_err(|_| {
            UpdateError::Config(format!("[{}] {}: invalid value '{}'", section, key, raw))
        }),
    }
}

impl ConfigFile {
    /// Load from `path`, falling back to defaults if the file does not exist.
    pub fn load(path: &Path) -> UpdateResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path).map_err(|e| {
            UpdateError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_ini(&ini)
    }

    /// Parse from INI text.
    pub fn parse_str(content: &str) -> UpdateResult<Self> {
        let ini = Ini::load_from_str(content)
            .map_err(|e| UpdateError::Config(format!("invalid INI: {}", e)))?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> UpdateResult<Self> {
        let mut config = Self::default();

        config.device.id = get(ini, "device", "id").map(str::to_string);

        config.server.check_url = get(ini, "server", "check_url").map(str::to_string);
        config.server.report_url = get(ini, "server", "report_url").map(str::to_string);
        if let Some(timeout) = parse(ini, "server", "timeout")? {
            config.server.timeout = timeout;
        }
        if let Some(step) = parse::<u8>(ini, "server", "progress_step")? {
            config.server.progress_step = step.clamp(1, 100);
        }

        if let Some(size) = parse(ini, "download", "buffer_size")? {
            config.download = config.download.with_buffer_size(size);
        }
        if let Some(size) = parse(ini, "download", "max_artifact_size")? {
            config.download = config.download.with_max_artifact_size(size);
        }

        config.retry = Self::parse_retry(ini)?;

        if let Some(secs) = parse::<u64>(ini, "schedule", "interval_secs")? {
            if secs == 0 {
                return Err(UpdateError::Config(
                    "[schedule] interval_secs: must be greater than zero".to_string(),
                ));
            }
            config.schedule.interval = Duration::from_secs(secs);
        }

        if let Some(dir) = get(ini, "storage", "directory") {
            config.storage.directory = PathBuf::from(dir);
        }
        if let Some(version) = get(ini, "storage", "factory_version") {
            config.storage.factory_version = version.to_string();
        }

        config.capabilities.battery_path =
            get(ini, "capabilities", "battery_path").map(PathBuf::from);
        if let Some(signal) = parse(ini, "capabilities", "signal_override")? {
            config.capabilities.signal = signal;
        }

        if let Some(level) = get(ini, "logging", "level") {
            config.logging.level = level.to_string();
        }
        config.logging.directory = get(ini, "logging", "directory").map(PathBuf::from);

        Ok(config)
    }

    fn parse_retry(ini: &Ini) -> UpdateResult<RetryPolicy> {
        let max_attempts: u32 =
            parse(ini, "retry", "max_attempts")?.unwrap_or(DEFAULT_MAX_ATTEMPTS);
        if max_attempts == 0 {
            return Err(UpdateError::Config(
                "[retry] max_attempts: must be at least 1".to_string(),
            ));
        }
        let delay = Duration::from_secs(
            parse(ini, "retry", "delay_secs")?.unwrap_or(DEFAULT_RETRY_DELAY_SECS),
        );

        match get(ini, "retry", "backoff").unwrap_or("fixed") {
            "fixed" => Ok(RetryPolicy::fixed(max_attempts, delay)),
            "exponential" => Ok(RetryPolicy::exponential_from(max_attempts, delay)),
            "none" => Ok(RetryPolicy::None),
            other => Err(UpdateError::Config(format!(
                "[retry] backoff: unknown strategy '{}' (expected fixed, exponential or none)",
                other
            ))),
        }
    }

    /// Build the orchestrator settings, requiring a device id and check URL.
    pub fn client_config(&self) -> UpdateResult<ClientConfig> {
        let device_id = self.device.id.clone().ok_or_else(|| {
            UpdateError::Config("[device] id is required".to_string())
        })?;
        let check_url = self.server.check_url.clone().ok_or_else(|| {
            UpdateError::Config("[server] check_url is required".to_string())
        })?;

        let mut config = ClientConfig::new(device_id, check_url)
            .with_timeout(Duration::from_secs(self.server.timeout))
            .with_download(self.download.clone())
            .with_retry(self.retry.clone())
            .with_progress_step(self.server.progress_step);
        if let Some(url) = &self.server.report_url {
            config = config.with_report_url(url.clone());
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
[device]
id = sensor-0042

[server]
check_url = https://ota.example.com/api/v1/check
report_url = https://ota.example.com/api/v1/report
timeout = 45

[download]
buffer_size = 1024
max_artifact_size = 2097152

[retry]
max_attempts = 5
delay_secs = 2
backoff = exponential

[schedule]
interval_secs = 600

[storage]
directory = /var/lib/otaclient
factory_version = 1.0.0

[capabilities]
battery_path = /sys/class/power_supply/BAT0/capacity
signal_override = -67

[logging]
level = debug
"#;

    #[test]
    fn test_parse_full_file() {
        let config = ConfigFile::parse_str(SAMPLE).unwrap();

        assert_eq!(config.device.id.as_deref(), Some("sensor-0042"));
        assert_eq!(config.server.timeout, 45);
        assert_eq!(config.download.buffer_size, 1024);
        assert_eq!(config.download.max_artifact_size, 2 * 1024 * 1024);
        assert_eq!(config.retry.max_attempts(), 5);
        assert!(matches!(config.retry, RetryPolicy::ExponentialBackoff { .. }));
        assert_eq!(config.schedule.interval, Duration::from_secs(600));
        assert_eq!(config.storage.directory, PathBuf::from("/var/lib/otaclient"));
        assert_eq!(config.storage.factory_version, "1.0.0");
        assert_eq!(config.capabilities.signal, -67);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.directory.is_none());
    }

    #[test]
    fn test_client_config_from_file() {
        let client = ConfigFile::parse_str(SAMPLE).unwrap().client_config().unwrap();

        assert_eq!(client.device_id, "sensor-0042");
        assert_eq!(client.check_url, "https://ota.example.com/api/v1/check");
        assert_eq!(
            client.report_url.as_deref(),
            Some("https://ota.example.com/api/v1/report")
        );
        assert_eq!(client.timeout, Duration::from_secs(45));
    }

    #[test]
    fn test_defaults_when_empty() {
        let config = ConfigFile::parse_str("").unwrap();

        assert_eq!(config.retry, RetryPolicy::fixed(3, Duration::from_secs(10)));
        assert_eq!(config.schedule.interval, Duration::from_secs(3600));
        assert_eq!(config.server.timeout, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn test_client_config_requires_device_id() {
        let config = ConfigFile::parse_str("[server]\ncheck_url = http://ota/check\n").unwrap();
        match config.client_config() {
            Err(UpdateError::Config(msg)) => assert!(msg.contains("[device] id")),
            other => panic!("Expected Config error, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_number_names_key() {
        let result = ConfigFile::parse_str("[download]\nbuffer_size = lots\n");
        match result {
            Err(UpdateError::Config(msg)) => {
                assert!(msg.contains("[download] buffer_size"));
                assert!(msg.contains("lots"));
            }
            other => panic!("Expected Config error, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_backoff_rejected() {
        let result = ConfigFile::parse_str("[retry]\nbackoff = random\n");
        assert!(matches!(result, Err(UpdateError::Config(_))));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let result = ConfigFile::parse_str("[retry]\nmax_attempts = 0\n");
        assert!(matches!(result, Err(UpdateError::Config(_))));
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let config = ConfigFile::load(&temp.path().join("absent.ini")).unwrap();
        assert!(config.device.id.is_none());
    }

    #[test]
    fn test_load_from_disk() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.ini");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = ConfigFile::load(&path).unwrap();
        assert_eq!(config.device.id.as_deref(), Some("sensor-0042"));
    }
}
