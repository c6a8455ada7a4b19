use crate::domain::model::{CommandOutput, CommandSpec};
use crate::domain::ports::CommandRunner;
use crate::utils::error::Result;
use async_trait::async_trait;
use tokio::process::Command;

/// Runs commands as child processes, capturing their output.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput> {
        tracing::debug!("Running `{}` in {}", command, command.cwd.display());

        let output = Command::new(&command.program)
            .args(&command.args)
            .current_dir(&command.cwd)
            .kill_on_drop(true)
            .output()
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        for line in stdout.lines() {
            tracing::debug!("[{}] {}", command.program_name(), line);
        }

        Ok(CommandOutput {
            success: output.status.success(),
            status: output.status.to_string(),
            stdout,
            stderr,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_captures_output_and_status() {
        let dir = TempDir::new().unwrap();
        let spec = CommandSpec::new("sh", dir.path())
            .arg("-c")
            .arg("echo hello; echo oops >&2; exit 3");

        let output = ProcessRunner::new().run(&spec).await.unwrap();

        assert!(!output.success);
        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.stderr.trim(), "oops");
        assert!(output.status.contains('3'));
    }

    #[tokio::test]
    async fn test_missing_program_is_not_found() {
        let dir = TempDir::new().unwrap();
        let spec = CommandSpec::new("definitely-not-a-real-interpreter", dir.path());

        let err = ProcessRunner::new().run(&spec).await.unwrap_err();

        match err {
            crate::SensorNetError::IoError(e) => {
                assert_eq!(e.kind(), std::io::ErrorKind::NotFound)
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
