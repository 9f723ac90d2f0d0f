//! Run command - one full update cycle with a progress bar.

use std::sync::Arc;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

use super::cancel_on_ctrlc;
use crate::error::CliError;
use crate::runner::{CliRunner, GlobalOptions};

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})";

/// Run the run command.
pub fn run(options: &GlobalOptions) -> Result<(), CliError> {
    let runner = CliRunner::new(options)?;
    runner.log_startup("run");
    let _lock = runner.lock_storage()?;

    let bar = ProgressBar::hidden();
    bar.set_style(
        ProgressStyle::default_bar()
            .template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    let observer_bar = bar.clone();
    let orchestrator = runner
        .orchestrator()?
        .with_observer(Arc::new(move |bytes, total| {
            if observer_bar.is_hidden() {
                observer_bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
            }
            observer_bar.set_length(total);
            observer_bar.set_position(bytes);
        }));

    let cancel = CancellationToken::new();
    cancel_on_ctrlc(&cancel)?;

    println!("Checking for updates ({})", orchestrator.config().check_url);
    let outcome = orchestrator.try_run(&cancel).ok_or(CliError::Busy)?;
    bar.finish_and_clear();

    if outcome.is_ok() {
        println!("{} {}", style("✓").green().bold(), outcome);
        Ok(())
    } else {
        Err(CliError::RunFailed(outcome.to_string()))
    }
}
