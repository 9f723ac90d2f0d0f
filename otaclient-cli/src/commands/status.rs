//! Status command - show the active firmware and any staged download.

use otaclient::storage::StorageBackend;

use crate::error::CliError;
use crate::runner::{CliRunner, GlobalOptions};

/// Run the status command.
pub fn run(options: &GlobalOptions) -> Result<(), CliError> {
    let runner = CliRunner::new(options)?;
    let storage = runner.storage()?;

    println!("Storage:        {}", runner.config().storage.directory.display());
    println!("Active version: {}", storage.active_version()?);
    println!("Rollback index: {}", storage.active_rollback_index()?);

    let staged = storage.staged_len()?;
    if staged == 0 {
        println!("Staged:         none");
    } else {
        let tag = storage.staged_tag()?.unwrap_or_else(|| "untagged".to_string());
        println!("Staged:         {} bytes ({})", staged, tag);
    }

    Ok(())
}
