//! Shared setup for commands that talk to the update server or storage.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use otaclient::capability::HostCapabilities;
use otaclient::config::{default_config_path, ConfigFile};
use otaclient::logging::{init_logging, LoggingGuard};
use otaclient::orchestrator::UpdateOrchestrator;
use otaclient::storage::{FsStorage, StorageLock};
use otaclient::transport::ReqwestTransport;
use tracing::{debug, info};

use crate::error::CliError;

/// Options shared by every subcommand.
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub config: Option<PathBuf>,
    pub verbose: bool,
}

/// Loads configuration, installs logging and builds library components.
pub struct CliRunner {
    config: ConfigFile,
    config_path: PathBuf,
    _logging: LoggingGuard,
}

impl CliRunner {
    pub fn new(options: &GlobalOptions) -> Result<Self, CliError> {
        let config_path = options.config.clone().unwrap_or_else(default_config_path);
        let config = ConfigFile::load(&config_path)?;

        let mut logging = config.logging.clone();
        if options.verbose {
            logging = logging.with_level("debug");
        }
        let guard = init_logging(&logging)?;

        Ok(Self {
            config,
            config_path,
            _logging: guard,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// Log version and configuration source for a command.
    pub fn log_startup(&self, command: &str) {
        info!(
            version = otaclient::VERSION,
            command,
            config = %self.config_path.display(),
            "otaclient starting"
        );
    }

    /// Open the staging and activation storage.
    pub fn storage(&self) -> Result<Arc<FsStorage>, CliError> {
        let section = &self.config.storage;
        debug!(directory = %section.directory.display(), "Opening storage");
        let storage = FsStorage::open(&section.directory)?
            .with_factory_version(section.factory_version.clone());
        Ok(Arc::new(storage))
    }

    /// Take the exclusive update lock on the storage directory.
    ///
    /// Hold the returned guard for as long as updates may run.
    pub fn lock_storage(&self) -> Result<StorageLock, CliError> {
        let lock = self.storage()?.try_lock()?;
        debug!(path = %lock.path().display(), "Holding storage lock");
        Ok(lock)
    }

    /// Build an orchestrator wired to HTTP, filesystem storage and host
    /// capabilities.
    pub fn orchestrator(&self) -> Result<UpdateOrchestrator, CliError> {
        let client = self.config.client_config()?;
        let storage = self.storage()?;
        let transport = ReqwestTransport::with_timeout(Duration::from_secs(
            self.config.server.timeout,
        ))?;

        let section = &self.config.capabilities;
        let mut capabilities = HostCapabilities::new(storage.staging_dir(), section.signal);
        if let Some(path) = &section.battery_path {
            capabilities = capabilities.with_battery_path(path.clone());
        }

        Ok(UpdateOrchestrator::new(
            client,
            Arc::new(transport),
            storage,
            Arc::new(capabilities),
        ))
    }
}
