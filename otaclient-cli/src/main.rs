//! otaclient - over-the-air firmware update client
//!
//! Command-line front end for the `otaclient` library: one-shot update
//! runs, a scheduled daemon, and inspection of local firmware state.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use console::style;

use error::CliError;
use runner::GlobalOptions;

#[derive(Parser)]
#[command(name = "otaclient")]
#[command(version = otaclient::VERSION)]
#[command(about = "Over-the-air firmware update client", long_about = None)]
struct Cli {
    /// Path to config.ini (defaults to the user config directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask the server whether an update is available
    Check,

    /// Run one full update cycle
    Run,

    /// Check for updates periodically until interrupted
    Daemon {
        /// Seconds between checks (overrides [schedule] interval_secs)
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Verify a file against an expected SHA-256 digest
    Verify {
        /// File to hash
        file: PathBuf,

        /// Expected digest as hex
        digest: String,
    },

    /// Show the active firmware and staged download
    Status,
}

fn main() {
    let cli = Cli::parse();
    let options = GlobalOptions {
        config: cli.config,
        verbose: cli.verbose,
    };

    let result = match cli.command {
        Commands::Check => commands::check::run(&options),
        Commands::Run => commands::run::run(&options),
        Commands::Daemon { interval } => commands::daemon::run(&options, interval),
        Commands::Verify { file, digest } => commands::verify::run(&file, &digest),
        Commands::Status => commands::status::run(&options),
    };

    if let Err(e) = result {
        exit_with(e);
    }
}

fn exit_with(error: CliError) -> ! {
    eprintln!("{} {}", style("error:").red().bold(), error);
    process::exit(error.exit_code());
}
