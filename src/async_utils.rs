//! Small helpers for working with Tokio.

use std::process::Output;

use anyhow::anyhow;

use crate::prelude::*;

/// Wrapper around [`tokio::task::spawn_blocking`] that propagates panics from
/// the background task.
pub async fn spawn_blocking_propagating_panics<F, T>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(value) => value,
        Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
        // Blocking tasks can only be cancelled during runtime shutdown.
        Err(err) => panic!("blocking task was cancelled: {err}"),
    }
}

/// Report any command failures, and include any error output.
///
/// The output of standard error and standard output will be logged at
/// appropriate levels.
pub fn check_for_command_failure(command_name: &str, output: &Output) -> Result<()> {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stdout.trim().is_empty() {
        debug!(
            command_name = command_name,
            output = %stdout,
            "Standard output from command"
        );
    }
    if !stderr.trim().is_empty() {
        warn!(
            command_name = command_name,
            output = %stderr,
            "Standard error from command",
        );
    }

    if output.status.success() {
        Ok(())
    } else if let Some(exit_code) = output.status.code() {
        Err(anyhow!(
            "{} failed with exit code {} and error output:\n{}",
            command_name,
            exit_code,
            stderr.trim_end(),
        ))
    } else {
        Err(anyhow!(
            "{} was terminated by a signal, with error output:\n{}",
            command_name,
            stderr.trim_end(),
        ))
    }
}
