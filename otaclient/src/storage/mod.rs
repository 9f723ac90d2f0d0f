//! Staging and activation of firmware artifacts.
//!
//! A [`StorageBackend`] owns two things:
//!
//! - the *staged artifact*, a growing byte region written by the downloader
//!   that doubles as the resume checkpoint across restarts, and
//! - the *active firmware*, replaced only through [`StorageBackend::activate_staged`].
//!
//! ```text
//! download ──append──► staged artifact ──verify──► activate ──► active firmware
//!                          ▲      │
//!                          └──────┘ staged_len() = resume offset
//! ```
//!
//! Implementations:
//! - [`FsStorage`]: files under a state directory
//! - [`MemoryStorage`]: in-memory, with failure injection for tests

mod fs;
mod memory;

pub use fs::{FsStorage, StorageLock, DEFAULT_FACTORY_VERSION};
pub use memory::MemoryStorage;

use std::io::Read;

use crate::descriptor::UpdateDescriptor;
use crate::error::UpdateResult;

/// How a staged writer treats existing staged bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageMode {
    /// Keep existing bytes and continue after them.
    Append,
    /// Drop existing bytes and start from zero.
    Truncate,
}

/// Sink for artifact bytes.
pub trait StagedWriter: Send {
    /// Append a chunk. The chunk is durable once this returns.
    fn append(&mut self, chunk: &[u8]) -> UpdateResult<()>;
}

/// Durable staging area plus the activation primitive.
pub trait StorageBackend: Send + Sync {
    /// Number of bytes currently staged.
    fn staged_len(&self) -> UpdateResult<u64>;

    /// Open the staged artifact for writing.
    fn stage_writer(&self, mode: StageMode) -> UpdateResult<Box<dyn StagedWriter>>;

    /// Open the staged artifact for reading.
    fn open_staged(&self) -> UpdateResult<Box<dyn Read + Send>>;

    /// Remove the staged artifact and its tag. Succeeds if nothing is staged.
    fn discard_staged(&self) -> UpdateResult<()>;

    /// Identity of the artifact being staged, if recorded.
    fn staged_tag(&self) -> UpdateResult<Option<String>>;

    /// Record the identity of the artifact being staged.
    fn set_staged_tag(&self, tag: &str) -> UpdateResult<()>;

    /// Atomically make the staged artifact the firmware that boots next.
    ///
    /// On error the previously active firmware stays active.
    fn activate_staged(&self, descriptor: &UpdateDescriptor) -> UpdateResult<()>;

    /// Version of the active firmware.
    fn active_version(&self) -> UpdateResult<String>;

    /// Anti-rollback index recorded by the last activation.
    fn active_rollback_index(&self) -> UpdateResult<u32>;
}

/// Rollback index to record when activating `descriptor` over `current`.
///
/// The index never decreases.
pub(crate) fn next_rollback_index(current: u32, descriptor: &UpdateDescriptor) -> u32 {
    descriptor
        .anti_rollback
        .map_or(current, |floor| floor.max(current))
}
