//! Update orchestration.
//!
//! [`UpdateOrchestrator`] sequences one update run:
//!
//! ```text
//! Idle ─► Checking ─► Evaluating ─► Downloading ─► Verifying ─► Installing ─► Reporting ─► Idle
//!            │            │              │              │             │
//!            └────────────┴──────────────┴──────────────┴─────────────┴──► Failed(reason)
//! ```
//!
//! A failed attempt is reported to the server. If the failure is transient
//! and the [`RetryPolicy`] allows, the run waits and starts over at
//! `Checking` with a fresh descriptor. The staged artifact survives between
//! attempts and runs, so a retried download resumes where it stopped.

mod outcome;
mod policy;

pub use outcome::{OrchestratorState, UpdateOutcome};
pub use policy::{RetryPolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY_SECS};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capability::CapabilityProvider;
use crate::config::ClientConfig;
use crate::descriptor::UpdateDescriptor;
use crate::download::{
    DownloadRequest, ProgressCounter, ProgressReporter, ResumableDownloader,
    DEFAULT_POLL_INTERVAL,
};
use crate::eligibility::{DeviceState, Eligibility, EligibilityGate};
use crate::error::{UpdateError, UpdateResult};
use crate::fetcher::DescriptorFetcher;
use crate::protocol::{JsonCodec, OutcomeReport, ReportStatus, WireCodec};
use crate::report::OutcomeReporter;
use crate::storage::StorageBackend;
use crate::transport::Transport;
use crate::verifier::IntegrityVerifier;

/// Granularity of cancellable backoff sleeps.
const BACKOFF_SLICE: Duration = Duration::from_millis(50);

/// Observer for download progress (bytes written, total bytes).
pub type ProgressObserver = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Result of a single attempt.
struct Attempt {
    outcome: UpdateOutcome,
    descriptor: Option<UpdateDescriptor>,
    retryable: bool,
}

impl Attempt {
    fn done(outcome: UpdateOutcome, descriptor: Option<UpdateDescriptor>) -> Self {
        Self {
            outcome,
            descriptor,
            retryable: false,
        }
    }

    fn failed(
        outcome: UpdateOutcome,
        descriptor: Option<UpdateDescriptor>,
        error: &UpdateError,
    ) -> Self {
        Self {
            outcome,
            descriptor,
            retryable: error.is_retryable(),
        }
    }
}

/// Clears the in-flight flag when a run ends.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Sequences check, download, verification and install with retries.
pub struct UpdateOrchestrator {
    config: ClientConfig,
    storage: Arc<dyn StorageBackend>,
    capabilities: Arc<dyn CapabilityProvider>,
    fetcher: DescriptorFetcher,
    downloader: ResumableDownloader,
    reporter: Arc<OutcomeReporter>,
    gate: EligibilityGate,
    verifier: IntegrityVerifier,
    observer: Option<ProgressObserver>,
    poll_interval: Duration,
    state: Mutex<OrchestratorState>,
    running: AtomicBool,
}

impl UpdateOrchestrator {
    /// Create an orchestrator speaking JSON over `transport`.
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        storage: Arc<dyn StorageBackend>,
        capabilities: Arc<dyn CapabilityProvider>,
    ) -> Self {
        Self::with_codec(
            config,
            transport,
            Arc::new(JsonCodec::new()),
            storage,
            capabilities,
        )
    }

    /// Create an orchestrator with a custom wire codec.
    pub fn with_codec(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        codec: Arc<dyn WireCodec>,
        storage: Arc<dyn StorageBackend>,
        capabilities: Arc<dyn CapabilityProvider>,
    ) -> Self {
        let fetcher =
            DescriptorFetcher::new(Arc::clone(&transport), Arc::clone(&codec), &config.check_url);
        let reporter = Arc::new(OutcomeReporter::new(
            Arc::clone(&transport),
            codec,
            config.report_url.clone(),
        ));
        let downloader = ResumableDownloader::new(transport, config.download.clone());
        let verifier = IntegrityVerifier::with_buffer_size(config.download.buffer_size);

        Self {
            config,
            storage,
            capabilities,
            fetcher,
            downloader,
            reporter,
            gate: EligibilityGate::new(),
            verifier,
            observer: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            state: Mutex::new(OrchestratorState::Idle),
            running: AtomicBool::new(false),
        }
    }

    /// Receive download progress (bytes written, total bytes).
    pub fn with_observer(mut self, observer: ProgressObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Set how often download progress is sampled.
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Current state of the state machine.
    pub fn state(&self) -> OrchestratorState {
        self.state.lock().clone()
    }

    /// Whether a run is in flight.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ask the server for an update without acting on it.
    pub fn check(&self) -> UpdateResult<Option<UpdateDescriptor>> {
        let current_version = self.storage.active_version()?;
        let snapshot = self.capabilities.snapshot()?;
        self.fetcher
            .fetch(&self.config.device_id, &current_version, &snapshot)
    }

    /// Run one update cycle unless one is already in flight.
    ///
    /// Returns `None` without doing anything when another run holds the
    /// orchestrator. `cancel` stops the run between download chunks or
    /// during a retry wait.
    pub fn try_run(&self, cancel: &CancellationToken) -> Option<UpdateOutcome> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Update run already in progress, skipping");
            return None;
        }
        let _guard = RunGuard(&self.running);

        Some(self.run_with_retries(cancel))
    }

    fn run_with_retries(&self, cancel: &CancellationToken) -> UpdateOutcome {
        let max_attempts = self.config.retry.max_attempts().max(1);
        let started = Instant::now();
        let mut attempt_no = 1;

        let final_attempt = loop {
            if cancel.is_cancelled() {
                break Attempt::done(UpdateOutcome::Cancelled, None);
            }

            let attempt = self.attempt(attempt_no, cancel);
            if !attempt.retryable || attempt_no >= max_attempts {
                break attempt;
            }

            let Some(delay) = self.config.retry.delay_for_attempt(attempt_no) else {
                break attempt;
            };

            warn!(
                attempt = attempt_no,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                outcome = %attempt.outcome,
                "Attempt failed, retrying"
            );
            self.report(&attempt, attempt_no, false);

            if !sleep_cancellable(delay, cancel) {
                break Attempt::done(UpdateOutcome::Cancelled, attempt.descriptor);
            }
            attempt_no += 1;
        };

        if final_attempt.outcome != UpdateOutcome::NoUpdate {
            self.transition(OrchestratorState::Reporting);
            self.report(&final_attempt, attempt_no, true);
        }
        self.transition(OrchestratorState::Idle);

        let outcome = final_attempt.outcome;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        if outcome.is_ok() {
            info!(attempts = attempt_no, elapsed_ms, outcome = %outcome, "Update run finished");
        } else {
            warn!(attempts = attempt_no, elapsed_ms, outcome = %outcome, "Update run failed");
        }
        outcome
    }

    /// One pass from `Checking` through `Installing`.
    fn attempt(&self, attempt_no: u32, cancel: &CancellationToken) -> Attempt {
        self.transition(OrchestratorState::Checking);
        debug!(attempt = attempt_no, "Starting update attempt");

        let descriptor = match self.check() {
            Ok(Some(descriptor)) => descriptor,
            Ok(None) => {
                info!("No update available");
                return Attempt::done(UpdateOutcome::NoUpdate, None);
            }
            Err(e) => {
                return self.fail(UpdateOutcome::CheckFailed(e.to_string()), None, &e);
            }
        };

        self.transition(OrchestratorState::Evaluating);
        let resumable = match self.resumable_bytes(&descriptor) {
            Ok(bytes) => bytes,
            Err(e) => {
                return self.fail(UpdateOutcome::DownloadFailed(e.to_string()), Some(descriptor), &e)
            }
        };
        if let Some(attempt) = self.gate_check(&descriptor, resumable) {
            return attempt;
        }

        self.transition(OrchestratorState::Downloading);
        if let Err(e) = self.download(&descriptor, attempt_no, cancel) {
            if matches!(e, UpdateError::Cancelled) {
                return Attempt::done(UpdateOutcome::Cancelled, Some(descriptor));
            }
            if e.discards_partial() {
                self.discard_staged();
            }
            return self.fail(UpdateOutcome::DownloadFailed(e.to_string()), Some(descriptor), &e);
        }

        // Verifying and Installing run to completion once started
        if cancel.is_cancelled() {
            info!("Cancelled after download, keeping staged artifact");
            return Attempt::done(UpdateOutcome::Cancelled, Some(descriptor));
        }

        self.transition(OrchestratorState::Verifying);
        match self.verify(&descriptor) {
            Ok(()) => {}
            Err(e @ UpdateError::VerificationMismatch { .. }) => {
                warn!(error = %e, "Staged artifact failed verification, discarding");
                self.discard_staged();
                return self.fail(UpdateOutcome::VerificationFailed, Some(descriptor), &e);
            }
            Err(e) => {
                return self.fail(UpdateOutcome::DownloadFailed(e.to_string()), Some(descriptor), &e)
            }
        }

        self.transition(OrchestratorState::Installing);
        let staged = match self.storage.staged_len() {
            Ok(bytes) => bytes,
            Err(e) => {
                return self.fail(UpdateOutcome::InstallFailed(e.to_string()), Some(descriptor), &e)
            }
        };
        if let Some(attempt) = self.gate_check(&descriptor, staged) {
            return attempt;
        }

        match self.install(&descriptor) {
            Ok(()) => {
                info!(version = %descriptor.version, "Firmware activated");
                let new_version = descriptor.version.clone();
                Attempt::done(UpdateOutcome::Success { new_version }, Some(descriptor))
            }
            Err(e) => {
                warn!(error = %e, "Install failed, previous firmware remains active");
                self.discard_staged();
                self.fail(UpdateOutcome::InstallFailed(e.to_string()), Some(descriptor), &e)
            }
        }
    }

    fn fail(
        &self,
        outcome: UpdateOutcome,
        descriptor: Option<UpdateDescriptor>,
        error: &UpdateError,
    ) -> Attempt {
        self.transition(OrchestratorState::Failed(error.to_string()));
        Attempt::failed(outcome, descriptor, error)
    }

    /// Bytes already staged for this descriptor, which need no new space.
    fn resumable_bytes(&self, descriptor: &UpdateDescriptor) -> UpdateResult<u64> {
        let staged = self.storage.staged_len()?;
        if staged == 0 {
            return Ok(0);
        }
        let tag = self.storage.staged_tag()?;
        Ok(if tag.as_deref() == Some(descriptor.digest.as_str()) {
            staged
        } else {
            0
        })
    }

    /// Evaluate the gate with fresh readings. Returns a finished attempt on
    /// denial or read failure.
    fn gate_check(&self, descriptor: &UpdateDescriptor, staged_bytes: u64) -> Option<Attempt> {
        let device = match self.device_state() {
            Ok(device) => device.with_staged_bytes(staged_bytes),
            Err(e) => {
                return Some(self.fail(
                    UpdateOutcome::CheckFailed(e.to_string()),
                    Some(descriptor.clone()),
                    &e,
                ))
            }
        };

        match self.gate.evaluate(descriptor, &device) {
            Eligibility::Allow => None,
            Eligibility::Deny(reason) => {
                info!(reason = %reason, version = %descriptor.version, "Update not eligible");
                let error = UpdateError::Ineligible(reason.clone());
                Some(self.fail(
                    UpdateOutcome::Ineligible(reason),
                    Some(descriptor.clone()),
                    &error,
                ))
            }
        }
    }

    fn device_state(&self) -> UpdateResult<DeviceState> {
        Ok(DeviceState {
            capabilities: self.capabilities.snapshot()?,
            current_version: self.storage.active_version()?,
            rollback_index: self.storage.active_rollback_index()?,
        })
    }

    fn download(
        &self,
        descriptor: &UpdateDescriptor,
        attempt_no: u32,
        cancel: &CancellationToken,
    ) -> UpdateResult<u64> {
        let mut template = self.report_template(Some(descriptor), attempt_no);
        template.is_final = false;
        let callback = self.reporter.progress_callback(
            template,
            self.config.progress_step,
            self.observer.clone(),
        );

        let counter = Arc::new(ProgressCounter::new());
        let reporter = ProgressReporter::start(
            Arc::clone(&counter),
            descriptor.size,
            callback,
            self.poll_interval,
        );

        let request = DownloadRequest {
            uri: &descriptor.download_uri,
            expected_size: Some(descriptor.size),
            digest_hint: Some(&descriptor.digest),
        };
        let result = self
            .downloader
            .download(&request, self.storage.as_ref(), &counter, cancel);
        reporter.finish();
        result
    }

    fn verify(&self, descriptor: &UpdateDescriptor) -> UpdateResult<()> {
        let mut reader = self.storage.open_staged()?;
        let verification = self
            .verifier
            .verify(&mut *reader, &descriptor.digest)
            .map_err(|e| UpdateError::storage("staged artifact", e))?;
        debug!(matched = verification.is_match(), "Verified staged artifact");
        verification.into_result()
    }

    fn install(&self, descriptor: &UpdateDescriptor) -> UpdateResult<()> {
        self.storage.activate_staged(descriptor)?;

        let active = self.storage.active_version()?;
        if active != descriptor.version {
            return Err(UpdateError::Install(format!(
                "active version is {} after activating {}",
                active, descriptor.version
            )));
        }
        Ok(())
    }

    fn discard_staged(&self) {
        if let Err(e) = self.storage.discard_staged() {
            warn!(error = %e, "Failed to discard staged artifact");
        }
    }

    fn report_template(
        &self,
        descriptor: Option<&UpdateDescriptor>,
        attempt_no: u32,
    ) -> OutcomeReport {
        let mut report = OutcomeReport::new(&self.config.device_id, ReportStatus::Downloading);
        report.campaign_id = descriptor.map(|d| d.campaign_id.clone());
        report.version = descriptor.map(|d| d.version.clone());
        report.attempt = attempt_no;
        report
    }

    fn report(&self, attempt: &Attempt, attempt_no: u32, is_final: bool) {
        let mut report = self.report_template(attempt.descriptor.as_ref(), attempt_no);
        report.status = attempt.outcome.report_status();
        report.reason = attempt.outcome.reason();
        report.is_final = is_final;
        self.reporter.send(&report);
    }

    fn transition(&self, next: OrchestratorState) {
        let mut state = self.state.lock();
        if *state != next {
            debug!(from = %*state, to = %next, "State transition");
            *state = next;
        }
    }
}

/// Sleep for `delay` unless cancelled. Returns `false` if cancelled.
fn sleep_cancellable(delay: Duration, cancel: &CancellationToken) -> bool {
    let deadline = Instant::now() + delay;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep(BACKOFF_SLICE.min(deadline - now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::StaticCapabilities;
    use crate::eligibility::DenyReason;
    use crate::storage::MemoryStorage;
    use crate::test_support::{descriptor_json, fixture, sha256_hex, MockResponse, MockTransport};
    use crate::transport::Method;

    const CHECK_URL: &str = "http://ota/check";
    const REPORT_URL: &str = "http://ota/report";
    const FW_URL: &str = "http://ota/fw-2.0.0.bin";

    struct Harness {
        transport: Arc<MockTransport>,
        storage: MemoryStorage,
        orchestrator: UpdateOrchestrator,
    }

    fn harness(storage: MemoryStorage, caps: StaticCapabilities, retry: RetryPolicy) -> Harness {
        let transport = Arc::new(MockTransport::new());
        let config = ClientConfig::new("dev-1", CHECK_URL)
            .with_report_url(REPORT_URL)
            .with_retry(retry);
        let orchestrator = UpdateOrchestrator::new(
            config,
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::new(storage.clone()),
            Arc::new(caps),
        )
        .with_progress_interval(Duration::from_millis(1));

        Harness {
            transport,
            storage,
            orchestrator,
        }
    }

    fn good_caps() -> StaticCapabilities {
        StaticCapabilities::new(90, -60, 1 << 20)
    }

    fn quick_retry(attempts: u32) -> RetryPolicy {
        RetryPolicy::fixed(attempts, Duration::from_millis(1))
    }

    fn offer(transport: &MockTransport, data: &[u8]) {
        transport.push(
            CHECK_URL,
            MockResponse::ok(descriptor_json(
                "2.0.0",
                &sha256_hex(data),
                data.len() as u64,
                FW_URL,
            )),
        );
    }

    fn final_reports(transport: &MockTransport) -> Vec<serde_json::Value> {
        transport
            .posted_json(REPORT_URL)
            .into_iter()
            .filter(|r| r["final"] == true)
            .collect()
    }

    fn run(h: &Harness) -> UpdateOutcome {
        h.orchestrator.try_run(&CancellationToken::new()).unwrap()
    }

    #[test]
    fn test_successful_update() {
        let data = fixture(1024);
        let h = harness(MemoryStorage::new("1.0.0"), good_caps(), quick_retry(3));
        offer(&h.transport, &data);
        h.transport.serve(FW_URL, data.clone());

        let outcome = run(&h);

        assert_eq!(
            outcome,
            UpdateOutcome::Success {
                new_version: "2.0.0".into()
            }
        );
        assert_eq!(h.storage.active_version().unwrap(), "2.0.0");
        assert_eq!(h.storage.active_image(), data);
        assert_eq!(h.orchestrator.state(), OrchestratorState::Idle);

        let reports = final_reports(&h.transport);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0]["status"], "success");
        assert_eq!(reports[0]["campaign_id"], "spring-rollout");
    }

    #[test]
    fn test_no_update_never_downloads() {
        let h = harness(MemoryStorage::new("1.0.0"), good_caps(), quick_retry(3));
        h.transport
            .push(CHECK_URL, MockResponse::ok(br#"{"update_available":false}"#.to_vec()));

        assert_eq!(run(&h), UpdateOutcome::NoUpdate);

        let requests = h.transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, CHECK_URL);
    }

    #[test]
    fn test_check_network_errors_exhaust_attempts() {
        let h = harness(MemoryStorage::new("1.0.0"), good_caps(), quick_retry(3));
        for _ in 0..5 {
            h.transport
                .push(CHECK_URL, MockResponse::network_error("connection refused"));
        }

        let outcome = run(&h);

        assert!(matches!(outcome, UpdateOutcome::CheckFailed(_)));
        assert_eq!(h.transport.requests_to(CHECK_URL).len(), 3);

        let reports = h.transport.posted_json(REPORT_URL);
        assert_eq!(reports.len(), 3);
        assert_eq!(reports[2]["final"], true);
        assert_eq!(reports[2]["attempt"], 3);
        assert!(reports[..2].iter().all(|r| r["final"] == false));
    }

    #[test]
    fn test_retry_refetches_descriptor_and_resumes() {
        let data = fixture(2048);
        let h = harness(MemoryStorage::new("1.0.0"), good_caps(), quick_retry(3));
        offer(&h.transport, &data);
        offer(&h.transport, &data);
        h.transport.push(FW_URL, MockResponse::network_error("reset by peer"));
        h.transport.serve(FW_URL, data.clone());

        assert!(run(&h).is_success());
        assert_eq!(h.transport.requests_to(CHECK_URL).len(), 2);
        assert_eq!(h.storage.active_image(), data);
    }

    #[test]
    fn test_low_battery_is_ineligible_without_artifact_request() {
        let data = fixture(1024);
        let h = harness(
            MemoryStorage::new("1.0.0"),
            StaticCapabilities::new(5, -60, 1 << 20),
            quick_retry(3),
        );
        offer(&h.transport, &data);
        h.transport.serve(FW_URL, data);

        let outcome = run(&h);

        assert_eq!(
            outcome,
            UpdateOutcome::Ineligible(DenyReason::BatteryLow {
                level: 5,
                required: 20
            })
        );
        assert!(h.transport.requests_to(FW_URL).is_empty());
        assert_eq!(h.storage.staged_len().unwrap(), 0);
        // Not retried
        assert_eq!(h.transport.requests_to(CHECK_URL).len(), 1);

        let reports = final_reports(&h.transport);
        assert_eq!(reports[0]["status"], "ineligible");
    }

    /// Battery that drains by one reading per snapshot, then stays put.
    struct DrainingBattery {
        readings: Mutex<Vec<u8>>,
    }

    impl CapabilityProvider for DrainingBattery {
        fn battery_percent(&self) -> UpdateResult<u8> {
            let mut readings = self.readings.lock();
            Ok(if readings.len() > 1 {
                readings.remove(0)
            } else {
                readings[0]
            })
        }

        fn signal_strength(&self) -> UpdateResult<i32> {
            Ok(-60)
        }

        fn free_storage(&self) -> UpdateResult<u64> {
            Ok(1 << 20)
        }
    }

    #[test]
    fn test_battery_drop_before_install_keeps_previous_firmware() {
        let data = fixture(1024);
        let transport = Arc::new(MockTransport::new());
        let storage = MemoryStorage::new("1.0.0");
        // Check, gate before download, gate before install
        let battery = DrainingBattery {
            readings: Mutex::new(vec![90, 90, 10]),
        };
        let orchestrator = UpdateOrchestrator::new(
            ClientConfig::new("dev-1", CHECK_URL)
                .with_report_url(REPORT_URL)
                .with_retry(quick_retry(3)),
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::new(storage.clone()),
            Arc::new(battery),
        )
        .with_progress_interval(Duration::from_millis(1));
        offer(&transport, &data);
        transport.serve(FW_URL, data.clone());

        let outcome = orchestrator.try_run(&CancellationToken::new()).unwrap();

        assert_eq!(
            outcome,
            UpdateOutcome::Ineligible(DenyReason::BatteryLow {
                level: 10,
                required: 20
            })
        );
        assert_eq!(transport.requests_to(FW_URL).len(), 1);
        assert_eq!(storage.activations(), 0);
        assert_eq!(storage.active_version().unwrap(), "1.0.0");
        // Verified artifact stays staged for the next run
        assert_eq!(storage.staged_bytes(), data);
        assert_eq!(final_reports(&transport)[0]["status"], "ineligible");
    }

    #[test]
    fn test_verification_mismatch_discards_artifact() {
        let data = fixture(1024);
        let mut corrupted = data.clone();
        corrupted[512] ^= 0xff;

        let h = harness(MemoryStorage::new("1.0.0"), good_caps(), quick_retry(3));
        offer(&h.transport, &data);
        h.transport.serve(FW_URL, corrupted);

        assert_eq!(run(&h), UpdateOutcome::VerificationFailed);
        assert_eq!(h.storage.staged_len().unwrap(), 0);
        assert_eq!(h.storage.active_version().unwrap(), "1.0.0");
        assert_eq!(h.transport.requests_to(CHECK_URL).len(), 1);
    }

    #[test]
    fn test_install_failure_keeps_previous_firmware() {
        let data = fixture(1024);
        let h = harness(MemoryStorage::new("1.0.0"), good_caps(), quick_retry(3));
        h.storage.fail_activation("flash write error");
        offer(&h.transport, &data);
        h.transport.serve(FW_URL, data);

        let outcome = run(&h);

        match outcome {
            UpdateOutcome::InstallFailed(reason) => assert!(reason.contains("flash write error")),
            other => panic!("Expected InstallFailed, got {:?}", other),
        }
        assert_eq!(h.storage.active_version().unwrap(), "1.0.0");
        assert_eq!(h.storage.staged_len().unwrap(), 0);
        assert_eq!(h.transport.requests_to(CHECK_URL).len(), 1);
    }

    #[test]
    fn test_progress_reports_sent_during_download() {
        let data = fixture(4096);
        let h = harness(MemoryStorage::new("1.0.0"), good_caps(), quick_retry(1));
        offer(&h.transport, &data);
        h.transport.serve(FW_URL, data);

        assert!(run(&h).is_success());

        let progress: Vec<serde_json::Value> = h
            .transport
            .posted_json(REPORT_URL)
            .into_iter()
            .filter(|r| r["status"] == "downloading")
            .collect();
        assert!(!progress.is_empty());
        assert_eq!(progress.last().unwrap()["progress"], 100);
        assert!(h
            .transport
            .requests_to(REPORT_URL)
            .iter()
            .all(|r| r.method == Method::Post));
    }

    #[test]
    fn test_cancelled_before_start() {
        let h = harness(MemoryStorage::new("1.0.0"), good_caps(), quick_retry(3));
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(h.orchestrator.try_run(&cancel), Some(UpdateOutcome::Cancelled));
        assert!(h.transport.requests_to(CHECK_URL).is_empty());
    }

    #[test]
    fn test_concurrent_run_is_skipped() {
        let h = harness(MemoryStorage::new("1.0.0"), good_caps(), quick_retry(1));
        h.orchestrator.running.store(true, Ordering::Release);

        assert_eq!(h.orchestrator.try_run(&CancellationToken::new()), None);
        assert!(h.transport.requests().is_empty());

        h.orchestrator.running.store(false, Ordering::Release);
        h.transport
            .push(CHECK_URL, MockResponse::ok(br#"{"update_available":false}"#.to_vec()));
        assert_eq!(
            h.orchestrator.try_run(&CancellationToken::new()),
            Some(UpdateOutcome::NoUpdate)
        );
        assert!(!h.orchestrator.is_running());
    }

    #[test]
    fn test_sleep_cancellable_returns_early() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let started = Instant::now();
        assert!(!sleep_cancellable(Duration::from_secs(10), &cancel));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
