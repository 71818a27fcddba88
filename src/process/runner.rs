//! Tokio subprocess runner

use crate::process::{CommandError, CommandOutput, CommandRunner, CommandSpec};
use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Runs commands as child processes
#[derive(Debug, Clone)]
pub struct TokioCommandRunner {
    /// Timeout for command execution in seconds
    timeout_secs: u64,
}

impl TokioCommandRunner {
    /// Create a new runner
    ///
    /// # Arguments
    /// * `timeout_secs` - Timeout applied to each command
    pub fn new(timeout_secs: u64) -> Self {
        Self { timeout_secs }
    }
}

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    /// Run a command and capture its output
    ///
    /// # Errors
    /// Returns `CommandError` if:
    /// - The executable cannot be spawned
    /// - The command times out (the child is killed)
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        debug!("Running command: {}", spec);

        let mut command = Command::new(&spec.program);
        command.args(&spec.args).kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }

        let result = timeout(Duration::from_secs(self.timeout_secs), command.output())
            .await
            .map_err(|_| CommandError::Timeout {
                program: spec.program.clone(),
                secs: self.timeout_secs,
            })?;

        let output = result.map_err(|e| CommandError::Spawn {
            program: spec.program.clone(),
            message: e.to_string(),
        })?;

        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if exit_code != 0 {
            warn!("{} exited with code {}: {}", spec.program, exit_code, stderr.trim());
        } else {
            debug!("{} returned {} bytes of output", spec.program, stdout.len());
        }

        Ok(CommandOutput {
            exit_code,
            stdout,
            stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_program_is_spawn_error() {
        let runner = TokioCommandRunner::new(5);
        let spec = CommandSpec::new("nonexistent-agentops-binary-12345");
        let result = runner.run(&spec).await;
        assert!(matches!(result, Err(CommandError::Spawn { .. })));
    }

    #[tokio::test]
    #[ignore] // Requires a POSIX shell
    async fn test_non_zero_exit_is_reported() {
        let runner = TokioCommandRunner::new(5);
        let spec = CommandSpec::new("sh").args(["-c", "echo out; echo err 1>&2; exit 3"]);

        let output = runner.run(&spec).await.unwrap();
        assert_eq!(output.exit_code, 3);
        assert!(output.stdout.contains("out"));

        let checked = runner.run_checked(&spec).await;
        assert!(matches!(checked, Err(CommandError::NonZeroExit { code: 3, .. })));
    }

    #[tokio::test]
    #[ignore] // Requires a POSIX shell
    async fn test_timeout() {
        let runner = TokioCommandRunner::new(1);
        let spec = CommandSpec::new("sleep").arg("10");
        let result = runner.run(&spec).await;
        assert!(matches!(result, Err(CommandError::Timeout { secs: 1, .. })));
    }
}
