//! Filesystem storage backend.
//!
//! Layout under the state directory:
//!
//! ```text
//! <root>/staging/artifact.part   partially or fully downloaded artifact
//! <root>/staging/artifact.tag    digest of the artifact being staged
//! <root>/active/firmware.bin     active firmware image
//! <root>/active/previous.bin     image replaced by the last activation
//! <root>/active/manifest.json    version and rollback index of firmware.bin
//! <root>/otaclient.lock          held by the process running updates
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{next_rollback_index, StageMode, StagedWriter, StorageBackend};
use crate::descriptor::UpdateDescriptor;
use crate::error::{UpdateError, UpdateResult};

const ARTIFACT_FILE: &str = "artifact.part";
const TAG_FILE: &str = "artifact.tag";
const FIRMWARE_FILE: &str = "firmware.bin";
const PREVIOUS_FILE: &str = "previous.bin";
const MANIFEST_FILE: &str = "manifest.json";
const LOCK_FILE: &str = "otaclient.lock";

/// Version reported before any firmware has been activated.
pub const DEFAULT_FACTORY_VERSION: &str = "0.0.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Manifest {
    version: String,
    rollback_index: u32,
    #[serde(default)]
    firmware_id: Option<String>,
    #[serde(default)]
    digest: Option<String>,
    #[serde(default)]
    activated_at: Option<String>,
}

/// [`StorageBackend`] keeping artifacts in files.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
    staging_dir: PathBuf,
    active_dir: PathBuf,
    factory_version: String,
}

impl FsStorage {
    /// Open (creating if needed) the storage rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> UpdateResult<Self> {
        let root = root.as_ref();
        let storage = Self {
            root: root.to_path_buf(),
            staging_dir: root.join("staging"),
            active_dir: root.join("active"),
            factory_version: DEFAULT_FACTORY_VERSION.to_string(),
        };

        for dir in [&storage.staging_dir, &storage.active_dir] {
            fs::create_dir_all(dir).map_err(|e| UpdateError::storage(dir, e))?;
        }
        Ok(storage)
    }

    /// Version to report while no manifest exists.
    pub fn with_factory_version(mut self, version: impl Into<String>) -> Self {
        self.factory_version = version.into();
        self
    }

    /// Take the exclusive update lock on this storage directory.
    ///
    /// Only one process at a time may stage or activate artifacts. The lock
    /// is released when the returned guard is dropped or the process exits.
    /// Fails with [`UpdateError::Locked`] when another holder exists.
    pub fn try_lock(&self) -> UpdateResult<StorageLock> {
        let path = self.root.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| UpdateError::storage(&path, e))?;

        // SAFETY: the descriptor stays owned by `file` for the whole call
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc != 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                return Err(UpdateError::Locked(path));
            }
            return Err(UpdateError::storage(&path, err));
        }

        debug!(path = %path.display(), "Acquired storage lock");
        Ok(StorageLock { _file: file, path })
    }

    /// Directory holding the staged artifact.
    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Path of the staged artifact.
    pub fn artifact_path(&self) -> PathBuf {
        self.staging_dir.join(ARTIFACT_FILE)
    }

    /// Path of the active firmware image.
    pub fn firmware_path(&self) -> PathBuf {
        self.active_dir.join(FIRMWARE_FILE)
    }

    fn tag_path(&self) -> PathBuf {
        self.staging_dir.join(TAG_FILE)
    }

    fn manifest_path(&self) -> PathBuf {
        self.active_dir.join(MANIFEST_FILE)
    }

    fn read_manifest(&self) -> UpdateResult<Option<Manifest>> {
        let path = self.manifest_path();
        match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|e| {
                UpdateError::storage(&path, io::Error::new(io::ErrorKind::InvalidData, e))
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(UpdateError::storage(&path, e)),
        }
    }

    /// Swap the staged artifact into place, restoring the old image on failure.
    ///
    /// The old image is preserved as `previous.bin` before the artifact is
    /// renamed over `firmware.bin`, so the boot path always holds a
    /// complete image.
    fn swap_in(&self, manifest: &Manifest) -> io::Result<()> {
        let firmware = self.firmware_path();
        let previous = self.active_dir.join(PREVIOUS_FILE);
        let manifest_tmp = self.active_dir.join(format!("{}.tmp", MANIFEST_FILE));

        write_synced(
            &manifest_tmp,
            &serde_json::to_vec_pretty(manifest)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?,
        )?;

        let had_firmware = firmware.exists();
        if had_firmware {
            if let Err(e) = preserve(&firmware, &previous) {
                log_cleanup(fs::remove_file(&manifest_tmp), &manifest_tmp);
                return Err(e);
            }
        }

        if let Err(e) = fs::rename(self.artifact_path(), &firmware) {
            log_cleanup(fs::remove_file(&manifest_tmp), &manifest_tmp);
            return Err(e);
        }

        if let Err(e) = fs::rename(&manifest_tmp, self.manifest_path()) {
            // Put the artifact back so the old manifest stays truthful
            log_cleanup(preserve(&firmware, &self.artifact_path()), &self.artifact_path());
            if had_firmware {
                log_cleanup(fs::rename(&previous, &firmware), &firmware);
            } else {
                log_cleanup(fs::remove_file(&firmware), &firmware);
            }
            log_cleanup(fs::remove_file(&manifest_tmp), &manifest_tmp);
            return Err(e);
        }

        sync_dir(&self.active_dir);
        Ok(())
    }
}

/// Make `to` a second name for `from`, replacing any existing `to`.
///
/// Falls back to a copy on filesystems without hard links.
fn preserve(from: &Path, to: &Path) -> io::Result<()> {
    match fs::remove_file(to) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    fs::hard_link(from, to).or_else(|_| fs::copy(from, to).map(|_| ()))
}

/// Log a failed step while undoing an activation.
fn log_cleanup(result: io::Result<()>, path: &Path) {
    if let Err(e) = result {
        warn!(path = %path.display(), error = %e, "Failed to restore state after activation error");
    }
}

/// Exclusive update lock on an [`FsStorage`] directory.
#[derive(Debug)]
pub struct StorageLock {
    _file: File,
    path: PathBuf,
}

impl StorageLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Write `bytes` to `path` and flush them to disk.
fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Best-effort fsync of a directory so renames survive power loss.
fn sync_dir(dir: &Path) {
    if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
        warn!(path = %dir.display(), error = %e, "Failed to sync directory");
    }
}

struct FileStagedWriter {
    file: File,
    path: PathBuf,
}

impl StagedWriter for FileStagedWriter {
    fn append(&mut self, chunk: &[u8]) -> UpdateResult<()> {
        self.file
            .write_all(chunk)
            .and_then(|_| self.file.sync_data())
            .map_err(|e| UpdateError::storage(&self.path, e))
    }
}

impl StorageBackend for FsStorage {
    fn staged_len(&self) -> UpdateResult<u64> {
        let path = self.artifact_path();
        match fs::metadata(&path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(UpdateError::storage(&path, e)),
        }
    }

    fn stage_writer(&self, mode: StageMode) -> UpdateResult<Box<dyn StagedWriter>> {
        let path = self.artifact_path();
        let mut options = OpenOptions::new();
        options.create(true);
        match mode {
            StageMode::Append => options.append(true),
            StageMode::Truncate => options.write(true).truncate(true),
        };

        let file = options
            .open(&path)
            .map_err(|e| UpdateError::storage(&path, e))?;
        Ok(Box::new(FileStagedWriter { file, path }))
    }

    fn open_staged(&self) -> UpdateResult<Box<dyn Read + Send>> {
        let path = self.artifact_path();
        let file = File::open(&path).map_err(|e| UpdateError::storage(&path, e))?;
        Ok(Box::new(file))
    }

    fn discard_staged(&self) -> UpdateResult<()> {
        for path in [self.artifact_path(), self.tag_path()] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(UpdateError::storage(&path, e)),
            }
        }
        Ok(())
    }

    fn staged_tag(&self) -> UpdateResult<Option<String>> {
        let path = self.tag_path();
        match fs::read_to_string(&path) {
            Ok(tag) => Ok(Some(tag.trim().to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(UpdateError::storage(&path, e)),
        }
    }

    fn set_staged_tag(&self, tag: &str) -> UpdateResult<()> {
        let path = self.tag_path();
        let tmp = self.staging_dir.join(format!("{}.tmp", TAG_FILE));
        write_synced(&tmp, tag.as_bytes())
            .and_then(|_| fs::rename(&tmp, &path))
            .map_err(|e| UpdateError::storage(&path, e))
    }

    fn activate_staged(&self, descriptor: &UpdateDescriptor) -> UpdateResult<()> {
        if !self.artifact_path().exists() {
            return Err(UpdateError::Install("no staged artifact".to_string()));
        }

        let current_index = self.active_rollback_index()?;
        let manifest = Manifest {
            version: descriptor.version.clone(),
            rollback_index: next_rollback_index(current_index, descriptor),
            firmware_id: Some(descriptor.firmware_id.clone()),
            digest: Some(descriptor.digest.clone()),
            activated_at: Some(chrono::Utc::now().to_rfc3339()),
        };

        self.swap_in(&manifest).map_err(|e| {
            UpdateError::Install(format!("failed to activate {}: {}", descriptor.version, e))
        })?;

        let tag = self.tag_path();
        match fs::remove_file(&tag) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => {
                warn!(path = %tag.display(), error = %e, "Failed to remove staged tag");
            }
            _ => {}
        }
        info!(
            version = %manifest.version,
            rollback_index = manifest.rollback_index,
            "Activated firmware"
        );
        Ok(())
    }

    fn active_version(&self) -> UpdateResult<String> {
        Ok(self
            .read_manifest()?
            .map(|m| m.version)
            .unwrap_or_else(|| self.factory_version.clone()))
    }

    fn active_rollback_index(&self) -> UpdateResult<u32> {
        Ok(self.read_manifest()?.map_or(0, |m| m.rollback_index))
    }
}
