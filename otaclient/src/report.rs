//! Progress and outcome reporting.
//!
//! Reports are best effort: a failed report is logged and never changes the
//! outcome of a run.

use std::sync::atomic::{AtomicI16, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::download::{percent_of, ProgressCallback};
use crate::protocol::{OutcomeReport, ReportStatus, WireCodec};
use crate::transport::{Transport, TransportRequest};

/// Sends [`OutcomeReport`]s to the report endpoint.
pub struct OutcomeReporter {
    transport: Arc<dyn Transport>,
    codec: Arc<dyn WireCodec>,
    report_url: Option<String>,
}

impl OutcomeReporter {
    /// Create a reporter. With no `report_url` every report is dropped.
    pub fn new(
        transport: Arc<dyn Transport>,
        codec: Arc<dyn WireCodec>,
        report_url: Option<String>,
    ) -> Self {
        Self {
            transport,
            codec,
            report_url,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.report_url.is_some()
    }

    /// Send `report`. Returns whether the server accepted it.
    pub fn send(&self, report: &OutcomeReport) -> bool {
        let Some(url) = &self.report_url else {
            return false;
        };

        let body = match self.codec.encode_report(report) {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "Failed to encode report");
                return false;
            }
        };

        match self
            .transport
            .send(TransportRequest::post(url, body, self.codec.content_type()))
        {
            Ok(response) if response.is_success() => {
                debug!(status = report.status.as_str(), attempt = report.attempt, "Report sent");
                true
            }
            Ok(response) => {
                warn!(url = %url, status = response.status, "Report rejected");
                false
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to send report");
                false
            }
        }
    }

    /// Build a download progress callback.
    ///
    /// Sends a `Downloading` report based on `template` each time progress
    /// crosses a multiple of `step` percent, then forwards to `observer`.
    pub fn progress_callback(
        self: &Arc<Self>,
        template: OutcomeReport,
        step: u8,
        observer: Option<Arc<dyn Fn(u64, u64) + Send + Sync>>,
    ) -> ProgressCallback {
        let reporter = Arc::clone(self);
        let step = step.clamp(1, 100);
        let last_bucket = AtomicI16::new(-1);

        Box::new(move |bytes, total| {
            if reporter.is_enabled() {
                let percent = percent_of(bytes, total);
                let bucket = i16::from(percent / step);
                if bucket > last_bucket.load(Ordering::Relaxed) {
                    last_bucket.store(bucket, Ordering::Relaxed);
                    let mut report = template.clone();
                    report.status = ReportStatus::Downloading;
                    report.progress = Some(percent);
                    report.is_final = false;
                    reporter.send(&report);
                }
            }
            if let Some(observer) = &observer {
                observer(bytes, total);
            }
        })
    }
}
