//! Privileged OS command execution
//!
//! Connection sharing is toggled through scripts run by the host shell.
//! The script text is an opaque payload here: the sharing service builds it,
//! an executor runs it. Tests swap in a recording executor.

use std::process::Command;
use thiserror::Error;
use tracing::debug;

/// Errors returned by a command executor
#[derive(Debug, Error)]
pub enum CommandError {
    /// The shell could not be started
    #[error("failed to run command: {0}")]
    Spawn(#[from] std::io::Error),

    /// The command ran and reported failure
    #[error("command failed ({status}): {output}")]
    Failed {
        /// Exit status description
        status: String,
        /// Combined stdout and stderr
        output: String,
    },
}

/// Runs a script with the privileges of the host process
pub trait CommandExecutor: Send + Sync {
    /// Run `script` and return its combined output
    fn run(&self, script: &str) -> Result<Vec<u8>, CommandError>;
}

/// Executes scripts with `powershell -Command`
#[derive(Debug, Clone, Default)]
pub struct PowerShell;

impl CommandExecutor for PowerShell {
    fn run(&self, script: &str) -> Result<Vec<u8>, CommandError> {
        debug!("Running powershell command: {}", script);

        let output = Command::new("powershell")
            .args(["-Command", script])
            .output()?;

        let mut combined = output.stdout;
        combined.extend_from_slice(&output.stderr);

        if output.status.success() {
            Ok(combined)
        } else {
            Err(CommandError::Failed {
                status: output.status.to_string(),
                output: String::from_utf8_lossy(&combined).trim().to_string(),
            })
        }
    }
}
