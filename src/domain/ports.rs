use crate::domain::model::{CommandOutput, CommandSpec};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// Runs external tools (interpreter, package installer).
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Spawns the command and waits for it. A spawn failure is an `Err`;
    /// a non-zero exit is reported through `CommandOutput::success`.
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput>;
}

pub trait EnvironmentProvider: Send + Sync {
    fn project_root(&self) -> &Path;
    /// Environment directory, relative to the project root unless absolute.
    fn venv_dir(&self) -> &Path;
    fn interpreter(&self) -> &str;
    /// Dependency manifest, relative to the project root unless absolute.
    fn manifest(&self) -> &Path;
}
