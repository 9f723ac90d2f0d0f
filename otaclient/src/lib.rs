//! otaclient - over-the-air firmware update client
//!
//! This library drives the update cycle of a constrained device:
//! capability-gated check, resumable download, SHA-256 verification,
//! atomic install and outcome reporting, with run-level retries.
//!
//! # Architecture
//!
//! ```text
//! UpdateScheduler ──► UpdateOrchestrator
//!                        ├── DescriptorFetcher ──┐
//!                        ├── EligibilityGate     │
//!                        ├── ResumableDownloader ┼──► Transport (HTTP)
//!                        ├── IntegrityVerifier   │
//!                        ├── OutcomeReporter ────┘
//!                        ├── StorageBackend (staging + activation)
//!                        └── CapabilityProvider (battery, signal, storage)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use otaclient::capability::StaticCapabilities;
//! use otaclient::config::ClientConfig;
//! use otaclient::orchestrator::UpdateOrchestrator;
//! use otaclient::storage::FsStorage;
//! use otaclient::transport::ReqwestTransport;
//! use tokio_util::sync::CancellationToken;
//!
//! # fn main() -> Result<(), otaclient::error::UpdateError> {
//! let config = ClientConfig::new("sensor-0042", "https://ota.example.com/api/v1/check");
//! let orchestrator = UpdateOrchestrator::new(
//!     config,
//!     Arc::new(ReqwestTransport::new()?),
//!     Arc::new(FsStorage::open("/var/lib/otaclient")?),
//!     Arc::new(StaticCapabilities::new(100, -50, 64 * 1024 * 1024)),
//! );
//!
//! if let Some(outcome) = orchestrator.try_run(&CancellationToken::new()) {
//!     println!("{}", outcome);
//! }
//! # Ok(())
//! # }
//! ```

pub mod capability;
pub mod config;
pub mod descriptor;
pub mod download;
pub mod eligibility;
pub mod error;
pub mod fetcher;
pub mod logging;
pub mod orchestrator;
pub mod protocol;
pub mod report;
pub mod scheduler;
pub mod storage;
pub mod transport;
pub mod verifier;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{UpdateError, UpdateResult};
pub use orchestrator::{UpdateOrchestrator, UpdateOutcome};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
