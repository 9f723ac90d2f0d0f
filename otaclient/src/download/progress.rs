//! Progress reporting for downloads.
//!
//! The download loop only stores its byte count into an atomic counter.
//! A dedicated reporter thread polls the counter and invokes the callback,
//! so a slow or failing callback (e.g. a network report) can never stall
//! the download.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Default interval between progress polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Progress callback.
///
/// # Arguments
///
/// * `bytes_written` - Bytes staged so far
/// * `total_bytes` - Advertised artifact size
pub type ProgressCallback = Box<dyn Fn(u64, u64) + Send + Sync>;

/// Counter shared between the download loop and the reporter thread.
#[derive(Debug, Default)]
pub struct ProgressCounter {
    bytes: AtomicU64,
    done: AtomicBool,
}

impl ProgressCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the current byte count. Never blocks.
    ///
    /// The published count never decreases: after a restart from zero it
    /// holds until the new download passes it.
    pub fn update(&self, bytes: u64) {
        self.bytes.fetch_max(bytes, Ordering::AcqRel);
    }

    /// Latest published byte count.
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Acquire)
    }

    /// Signal that the download has ended.
    pub fn signal_done(&self) {
        self.done.store(true, Ordering::Release);
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}

/// Background thread forwarding counter changes to a callback.
pub struct ProgressReporter {
    handle: Option<JoinHandle<()>>,
    counter: Arc<ProgressCounter>,
}

impl ProgressReporter {
    /// Start a reporter polling `counter` every `poll_interval`.
    ///
    /// The callback runs only when the byte count changed since the last
    /// call, plus once more after the download ends.
    pub fn start(
        counter: Arc<ProgressCounter>,
        total_bytes: u64,
        callback: ProgressCallback,
        poll_interval: Duration,
    ) -> Self {
        let counter_clone = Arc::clone(&counter);

        let handle = thread::Builder::new()
            .name("ota-progress".to_string())
            .spawn(move || {
                let mut last_reported = None;
                while !counter_clone.is_done() {
                    let bytes = counter_clone.bytes();
                    if last_reported != Some(bytes) {
                        callback(bytes, total_bytes);
                        last_reported = Some(bytes);
                    }
                    thread::sleep(poll_interval);
                }

                // Final report
                let bytes = counter_clone.bytes();
                if last_reported != Some(bytes) {
                    callback(bytes, total_bytes);
                }
            });

        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to spawn progress reporter");
                None
            }
        };

        Self { handle, counter }
    }

    /// The counter the download loop should update.
    pub fn counter(&self) -> &Arc<ProgressCounter> {
        &self.counter
    }

    /// Stop the reporter after a final report and wait for it.
    pub fn finish(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.counter.signal_done();
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.stop();
    }
}
