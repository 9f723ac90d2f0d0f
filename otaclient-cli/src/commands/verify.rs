//! Verify command - hash a file and compare it with an expected digest.

use std::path::Path;

use console::style;
use otaclient::verifier::{IntegrityVerifier, Verification};

use crate::error::CliError;

/// Run the verify command.
pub fn run(file: &Path, digest: &str) -> Result<(), CliError> {
    match IntegrityVerifier::new().verify_file(file, digest)? {
        Verification::Match => {
            println!("{} {}", style("OK").green().bold(), file.display());
            Ok(())
        }
        Verification::Mismatch { expected, actual } => {
            Err(CliError::DigestMismatch { expected, actual })
        }
    }
}
