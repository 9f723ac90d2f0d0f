//! Daemon command - scheduled update runs until Ctrl+C.

use std::sync::Arc;
use std::time::Duration;

use otaclient::scheduler::UpdateScheduler;
use otaclient::UpdateOutcome;
use tokio_util::sync::CancellationToken;

use super::cancel_on_ctrlc;
use crate::error::CliError;
use crate::runner::{CliRunner, GlobalOptions};

/// Run the daemon command.
pub fn run(options: &GlobalOptions, interval_secs: Option<u64>) -> Result<(), CliError> {
    let runner = CliRunner::new(options)?;
    runner.log_startup("daemon");
    let _lock = runner.lock_storage()?;

    let interval = match interval_secs {
        Some(0) => {
            return Err(CliError::Config(
                "--interval must be greater than zero".to_string(),
            ))
        }
        Some(secs) => Duration::from_secs(secs),
        None => runner.config().schedule.interval,
    };

    let orchestrator = Arc::new(runner.orchestrator()?);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::Runtime(e.to_string()))?;

    let shutdown = CancellationToken::new();
    cancel_on_ctrlc(&shutdown)?;

    println!("otaclient daemon v{}", otaclient::VERSION);
    println!("  Device:   {}", orchestrator.config().device_id);
    println!("  Interval: {}s", interval.as_secs());
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let scheduler = UpdateScheduler::new(orchestrator, interval)
        .with_outcome_handler(Arc::new(|outcome: &UpdateOutcome| {
            if !matches!(outcome, UpdateOutcome::NoUpdate) {
                println!("{}", outcome);
            }
        }));

    let stats = runtime.block_on(scheduler.run(shutdown));
    println!("Stopped after {} runs ({} skipped)", stats.runs, stats.skipped);

    Ok(())
}
