//! Check command - ask the server for an update without installing it.

use otaclient::storage::StorageBackend;

use crate::error::CliError;
use crate::runner::{CliRunner, GlobalOptions};

/// Run the check command.
pub fn run(options: &GlobalOptions) -> Result<(), CliError> {
    let runner = CliRunner::new(options)?;
    runner.log_startup("check");

    let orchestrator = runner.orchestrator()?;
    let current = runner.storage()?.active_version()?;

    println!("Device:  {}", orchestrator.config().device_id);
    println!("Current: {}", current);
    println!();

    match orchestrator.check()? {
        Some(descriptor) => {
            println!("Update available");
            println!("  Firmware: {}", descriptor.firmware_id);
            println!("  Version:  {}", descriptor.version);
            println!("  Campaign: {}", descriptor.campaign_id);
            println!("  Size:     {} bytes", descriptor.size);
            println!("  SHA-256:  {}", descriptor.digest);
            println!("  Source:   {}", descriptor.download_uri);
            println!(
                "  Requires: battery >= {}%, signal >= {} dBm",
                descriptor.min_battery, descriptor.min_signal
            );
            if let Some(floor) = descriptor.anti_rollback {
                println!("  Rollback: index {}", floor);
            }
        }
        None => println!("No update available"),
    }

    Ok(())
}
