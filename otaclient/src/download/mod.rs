//! Resumable artifact downloader.
//!
//! This module fetches a firmware artifact into a [`StorageBackend`]:
//! - Resume from the staged length via HTTP Range requests (`mod.rs`)
//! - Per-attempt progress tracking (`state`)
//! - Non-blocking progress reporting (`progress`)
//!
//! # Resume protocol
//!
//! ```text
//! staged_len = N ──► GET Range: bytes=N- ──► 206, Content-Range start N ──► append
//!                                        ├─► 200 (range ignored)        ──► truncate, restart at 0
//!                                        ├─► 206, start M != N          ──► GET from 0
//!                                        ├─► 416 (range unsatisfiable)  ──► discard, GET from 0
//!                                        └─► other                      ──► ProtocolError
//! ```
//!
//! Each chunk is appended durably before the next one is read, so a crash
//! loses at most one chunk. A hard size ceiling guards against a bogus or
//! hostile descriptor regardless of its advertised size.

mod progress;
mod state;

pub use progress::{ProgressCallback, ProgressCounter, ProgressReporter, DEFAULT_POLL_INTERVAL};
pub use state::{percent_of, DownloadState};

use std::io::{self, Read};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DownloadConfig;
use crate::error::{UpdateError, UpdateResult};
use crate::storage::{StageMode, StorageBackend};
use crate::transport::{
    Transport, TransportRequest, TransportResponse, STATUS_OK, STATUS_PARTIAL_CONTENT,
    STATUS_RANGE_NOT_SATISFIABLE,
};

/// What to download.
#[derive(Debug, Clone, Copy)]
pub struct DownloadRequest<'a> {
    pub uri: &'a str,
    /// Advertised artifact size. A finished download must match it exactly.
    pub expected_size: Option<u64>,
    /// Digest of the artifact, used to tell a matching partial artifact
    /// from a stale one.
    pub digest_hint: Option<&'a str>,
}

/// Downloads artifacts through a [`Transport`] into a [`StorageBackend`].
pub struct ResumableDownloader {
    transport: Arc<dyn Transport>,
    config: DownloadConfig,
}

impl ResumableDownloader {
    pub fn new(transport: Arc<dyn Transport>, config: DownloadConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Download `request.uri` into the staged artifact of `storage`.
    ///
    /// Resumes from any partial artifact already staged. `cancel` is checked
    /// before every chunk write; a cancelled download keeps its partial
    /// artifact. Returns the final staged length.
    pub fn download(
        &self,
        request: &DownloadRequest<'_>,
        storage: &dyn StorageBackend,
        progress: &ProgressCounter,
        cancel: &CancellationToken,
    ) -> UpdateResult<u64> {
        let offset = self.prepare_resume(request, storage)?;
        let mut state = DownloadState::resume_at(offset, request.expected_size);
        progress.update(offset);

        if offset > 0 && state.is_complete() {
            info!(uri = request.uri, bytes = offset, "Artifact already fully staged");
            return Ok(offset);
        }

        if cancel.is_cancelled() {
            return Err(UpdateError::Cancelled);
        }

        let (response, mode) = self.open_stream(request.uri, &mut state)?;

        if let Some(length) = response.content_length {
            let projected = state.bytes_written.saturating_add(length);
            if projected > self.config.max_artifact_size {
                discard_quietly(storage);
                return Err(UpdateError::Oversize {
                    limit: self.config.max_artifact_size,
                    received: projected,
                });
            }
        }

        self.stream_body(request.uri, response.body, mode, &mut state, storage, progress, cancel)?;

        if let Some(expected) = state.expected_total {
            if state.bytes_written != expected {
                return Err(UpdateError::IncompleteDownload {
                    expected,
                    actual: state.bytes_written,
                });
            }
        }

        info!(uri = request.uri, bytes = state.bytes_written, "Download complete");
        Ok(state.bytes_written)
    }

    /// Determine the resume offset, discarding a partial artifact that
    /// cannot belong to this download.
    fn prepare_resume(
        &self,
        request: &DownloadRequest<'_>,
        storage: &dyn StorageBackend,
    ) -> UpdateResult<u64> {
        let staged = storage.staged_len()?;

        let stale = if staged == 0 {
            false
        } else if let Some(hint) = request.digest_hint {
            let tag = storage.staged_tag()?;
            if tag.as_deref() != Some(hint) {
                warn!(
                    staged,
                    tag = tag.as_deref().unwrap_or("<none>"),
                    "Staged artifact belongs to a different update, discarding"
                );
                true
            } else {
                false
            }
        } else {
            false
        };

        let too_long = request.expected_size.is_some_and(|size| staged > size)
            || staged > self.config.max_artifact_size;
        if too_long {
            warn!(staged, "Staged artifact longer than expected, discarding");
        }

        if staged == 0 || stale || too_long {
            storage.discard_staged()?;
            if let Some(hint) = request.digest_hint {
                storage.set_staged_tag(hint)?;
            }
            return Ok(0);
        }

        debug!(offset = staged, "Resuming staged artifact");
        Ok(staged)
    }

    /// Issue the GET and decide how its body relates to the staged bytes.
    fn open_stream(
        &self,
        uri: &str,
        state: &mut DownloadState,
    ) -> UpdateResult<(TransportResponse, StageMode)> {
        let offset = state.bytes_written;
        let mut request = TransportRequest::get(uri);
        if offset > 0 {
            request = request.with_range_start(offset);
        }

        let response = self.transport.send(request)?;
        let status = response.status;

        match status {
            STATUS_PARTIAL_CONTENT if offset > 0 && starts_at(&response, offset) => {
                debug!(uri, offset, "Server honoured range request");
                Ok((response, StageMode::Append))
            }
            STATUS_OK => {
                if offset > 0 {
                    warn!(uri, offset, "Server ignored range request, restarting from zero");
                }
                state.restart();
                Ok((response, StageMode::Truncate))
            }
            STATUS_PARTIAL_CONTENT if starts_at(&response, 0) => {
                state.restart();
                Ok((response, StageMode::Truncate))
            }
            STATUS_PARTIAL_CONTENT if offset > 0 => {
                // Body starts somewhere else; appending it would corrupt the artifact
                warn!(
                    uri,
                    offset,
                    start = response.content_range_start,
                    "Partial content at wrong offset, restarting from zero"
                );
                drop(response);
                state.restart();
                self.open_stream(uri, state)
            }
            STATUS_RANGE_NOT_SATISFIABLE if offset > 0 => {
                warn!(uri, offset, "Resume offset rejected, restarting from zero");
                drop(response);
                state.restart();
                self.open_stream(uri, state)
            }
            _ => Err(UpdateError::Protocol {
                url: uri.to_string(),
                status,
            }),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn stream_body(
        &self,
        uri: &str,
        mut body: Box<dyn Read + Send>,
        mode: StageMode,
        state: &mut DownloadState,
        storage: &dyn StorageBackend,
        progress: &ProgressCounter,
        cancel: &CancellationToken,
    ) -> UpdateResult<()> {
        let mut writer = storage.stage_writer(mode)?;
        let mut buffer = vec![0u8; self.config.buffer_size.max(1)];
        let limit = self.config.max_artifact_size;

        loop {
            let bytes_read = read_chunk(&mut *body, &mut buffer)
                .map_err(|e| UpdateError::network(uri, format!("read error: {}", e)))?;
            if bytes_read == 0 {
                return Ok(());
            }

            if cancel.is_cancelled() {
                info!(bytes = state.bytes_written, "Download cancelled, keeping partial artifact");
                return Err(UpdateError::Cancelled);
            }

            let next = state.bytes_written + bytes_read as u64;
            if next > limit {
                discard_quietly(storage);
                return Err(UpdateError::Oversize {
                    limit,
                    received: next,
                });
            }
            if let Some(expected) = state.expected_total {
                if next > expected {
                    discard_quietly(storage);
                    return Err(UpdateError::IncompleteDownload {
                        expected,
                        actual: next,
                    });
                }
            }

            writer.append(&buffer[..bytes_read])?;
            state.record_chunk(bytes_read);
            progress.update(state.bytes_written);
        }
    }
}

/// Read one chunk, retrying on `Interrupted`.
fn read_chunk(body: &mut dyn Read, buffer: &mut [u8]) -> io::Result<usize> {
    loop {
        match body.read(buffer) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

/// Whether a partial response body begins at byte `offset`.
fn starts_at(response: &TransportResponse, offset: u64) -> bool {
    response.content_range_start.map_or(true, |start| start == offset)
}

fn discard_quietly(storage: &dyn StorageBackend) {
    if let Err(e) = storage.discard_staged() {
        warn!(error = %e, "Failed to discard staged artifact");
    }
}
