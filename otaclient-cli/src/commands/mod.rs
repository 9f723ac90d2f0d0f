//! Subcommand implementations.

pub mod check;
pub mod daemon;
pub mod run;
pub mod status;
pub mod verify;

use tokio_util::sync::CancellationToken;

use crate::error::CliError;

/// Cancel `token` when the user presses Ctrl+C.
pub(crate) fn cancel_on_ctrlc(token: &CancellationToken) -> Result<(), CliError> {
    let token = token.clone();
    ctrlc::set_handler(move || {
        eprintln!();
        eprintln!("Received shutdown signal, stopping...");
        token.cancel();
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))
}
