//! In-memory storage backend.

use std::io::{self, Cursor, Read};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{next_rollback_index, StageMode, StagedWriter, StorageBackend};
use crate::descriptor::UpdateDescriptor;
use crate::error::{UpdateError, UpdateResult};

const MEMORY_PATH: &str = "<memory>";

#[derive(Debug, Default)]
struct Inner {
    staged: Vec<u8>,
    tag: Option<String>,
    active_version: String,
    active_image: Vec<u8>,
    rollback_index: u32,
    fail_activation: Option<String>,
    write_limit: Option<u64>,
    activations: usize,
}

/// [`StorageBackend`] holding everything in memory.
///
/// Clones share the same state, so a test can keep a handle while the
/// orchestrator owns another.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStorage {
    /// Create a storage whose active firmware is `version`.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                active_version: version.into(),
                ..Inner::default()
            })),
        }
    }

    /// Set the rollback index of the active firmware.
    pub fn with_rollback_index(self, index: u32) -> Self {
        self.inner.lock().rollback_index = index;
        self
    }

    /// Pre-populate the staged artifact, as if left by an earlier run.
    pub fn with_staged(self, bytes: &[u8], tag: Option<&str>) -> Self {
        {
            let mut inner = self.inner.lock();
            inner.staged = bytes.to_vec();
            inner.tag = tag.map(str::to_string);
        }
        self
    }

    /// Make the next activations fail with `reason`.
    pub fn fail_activation(&self, reason: impl Into<String>) {
        self.inner.lock().fail_activation = Some(reason.into());
    }

    /// Fail staged writes once the artifact would exceed `limit` bytes.
    pub fn limit_writes(&self, limit: u64) {
        self.inner.lock().write_limit = Some(limit);
    }

    /// Copy of the staged bytes.
    pub fn staged_bytes(&self) -> Vec<u8> {
        self.inner.lock().staged.clone()
    }

    /// Copy of the active firmware image.
    pub fn active_image(&self) -> Vec<u8> {
        self.inner.lock().active_image.clone()
    }

    /// Number of successful activations.
    pub fn activations(&self) -> usize {
        self.inner.lock().activations
    }
}

struct MemoryStagedWriter {
    inner: Arc<Mutex<Inner>>,
}

impl StagedWriter for MemoryStagedWriter {
    fn append(&mut self, chunk: &[u8]) -> UpdateResult<()> {
        let mut inner = self.inner.lock();
        if let Some(limit) = inner.write_limit {
            if inner.staged.len() as u64 + chunk.len() as u64 > limit {
                return Err(UpdateError::storage(
                    MEMORY_PATH,
                    io::Error::new(io::ErrorKind::Other, "no space left"),
                ));
            }
        }
        inner.staged.extend_from_slice(chunk);
        Ok(())
    }
}

impl StorageBackend for MemoryStorage {
    fn staged_len(&self) -> UpdateResult<u64> {
        Ok(self.inner.lock().staged.len() as u64)
    }

    fn stage_writer(&self, mode: StageMode) -> UpdateResult<Box<dyn StagedWriter>> {
        if mode == StageMode::Truncate {
            self.inner.lock().staged.clear();
        }
        Ok(Box::new(MemoryStagedWriter {
            inner: Arc::clone(&self.inner),
        }))
    }

    fn open_staged(&self) -> UpdateResult<Box<dyn Read + Send>> {
        Ok(Box::new(Cursor::new(self.staged_bytes())))
    }

    fn discard_staged(&self) -> UpdateResult<()> {
        let mut inner = self.inner.lock();
        inner.staged.clear();
        inner.tag = None;
        Ok(())
    }

    fn staged_tag(&self) -> UpdateResult<Option<String>> {
        Ok(self.inner.lock().tag.clone())
    }

    fn set_staged_tag(&self, tag: &str) -> UpdateResult<()> {
        self.inner.lock().tag = Some(tag.to_string());
        Ok(())
    }

    fn activate_staged(&self, descriptor: &UpdateDescriptor) -> UpdateResult<()> {
        let mut inner = self.inner.lock();
        if let Some(reason) = &inner.fail_activation {
            return Err(UpdateError::Install(reason.clone()));
        }
        if inner.staged.is_empty() {
            return Err(UpdateError::Install("no staged artifact".to_string()));
        }

        inner.active_image = std::mem::take(&mut inner.staged);
        inner.active_version = descriptor.version.clone();
        inner.rollback_index = next_rollback_index(inner.rollback_index, descriptor);
        inner.tag = None;
        inner.activations += 1;
        Ok(())
    }

    fn active_version(&self) -> UpdateResult<String> {
        Ok(self.inner.lock().active_version.clone())
    }

    fn active_rollback_index(&self) -> UpdateResult<u32> {
        Ok(self.inner.lock().rollback_index)
    }
}
