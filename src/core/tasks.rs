//! Bootstrap tasks for the project's isolated Python environment.

use crate::domain::model::{CleanReport, CommandSpec};
use crate::domain::ports::{CommandRunner, EnvironmentProvider};
use crate::utils::error::{Result, SensorNetError};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

const BYTECODE_CACHE_DIR: &str = "__pycache__";
const BYTECODE_EXTENSIONS: [&str; 2] = ["pyc", "pyo"];

pub struct EnvTasks<R: CommandRunner, C: EnvironmentProvider> {
    runner: R,
    config: C,
}

impl<R: CommandRunner, C: EnvironmentProvider> EnvTasks<R, C> {
    pub fn new(runner: R, config: C) -> Self {
        Self { runner, config }
    }

    pub fn venv_path(&self) -> PathBuf {
        self.config.project_root().join(self.config.venv_dir())
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.config.project_root().join(self.config.manifest())
    }

    /// Removes compiled bytecode and `__pycache__` directories below the project root.
    pub async fn clean(&self) -> Result<CleanReport> {
        let root = self.config.project_root();
        let mut report = CleanReport::default();

        let mut walker = WalkDir::new(root).into_iter();
        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.io_error().map(|io| io.kind()) == Some(ErrorKind::NotFound) => {
                    continue
                }
                Err(e) => return Err(std::io::Error::from(e).into()),
            };

            let file_type = entry.file_type();
            if file_type.is_dir() && entry.file_name() == BYTECODE_CACHE_DIR {
                walker.skip_current_dir();
                if remove_ignoring_missing(entry.path(), true)? {
                    tracing::debug!("Removed {}", entry.path().display());
                    report.dirs_removed += 1;
                }
            } else if file_type.is_file() && is_bytecode(entry.path()) {
                if remove_ignoring_missing(entry.path(), false)? {
                    tracing::debug!("Removed {}", entry.path().display());
                    report.files_removed += 1;
                }
            }
        }

        tracing::info!(
            "Cleaned {} bytecode files and {} cache directories",
            report.files_removed,
            report.dirs_removed
        );
        Ok(report)
    }

    /// Installs the manifest into the existing environment.
    pub async fn depends(&self) -> Result<()> {
        let venv = self.venv_path();
        let installer = find_installer(&venv).ok_or_else(|| SensorNetError::EnvironmentMissing {
            path: venv.clone(),
        })?;

        let manifest = self.manifest_path();
        if !manifest.is_file() {
            return Err(SensorNetError::ManifestMissing { path: manifest });
        }

        let command = installer
            .into_command(self.config.project_root())
            .arg("install")
            .arg("-r")
            .arg(manifest.as_os_str());

        tracing::info!("Installing dependencies from {}", manifest.display());
        self.run_checked(&command).await?;
        tracing::info!("Dependencies installed into {}", venv.display());
        Ok(())
    }

    /// Creates the environment, then installs the manifest into it.
    pub async fn venv(&self) -> Result<()> {
        let venv = self.venv_path();
        self.ensure_not_project_root(&venv)?;

        let root = self.config.project_root();
        if !root.is_dir() {
            return Err(SensorNetError::InvalidConfigValueError {
                field: "environment.root".to_string(),
                value: root.display().to_string(),
                reason: "Project root does not exist".to_string(),
            });
        }

        let interpreter = self.config.interpreter();
        let command = CommandSpec::new(interpreter, self.config.project_root())
            .arg("-m")
            .arg("venv")
            .arg(venv.as_os_str());

        tracing::info!("Creating environment at {} with {}", venv.display(), interpreter);
        match self.run_checked(&command).await {
            Err(SensorNetError::IoError(e)) if e.kind() == ErrorKind::NotFound => {
                return Err(SensorNetError::InterpreterUnavailable {
                    interpreter: interpreter.to_string(),
                })
            }
            other => other?,
        }

        self.depends().await
    }

    /// Deletes the environment directory. Returns whether anything was removed.
    pub async fn reset(&self) -> Result<bool> {
        let venv = self.venv_path();
        self.ensure_not_project_root(&venv)?;

        let removed = remove_ignoring_missing(&venv, true)?;
        if removed {
            tracing::info!("Removed environment {}", venv.display());
        } else {
            tracing::info!("No environment at {}, nothing to reset", venv.display());
        }
        Ok(removed)
    }

    async fn run_checked(&self, command: &CommandSpec) -> Result<()> {
        let output = self.runner.run(command).await?;
        if !output.success {
            tracing::error!("`{}` failed with {}", command, output.status);
            for line in output.stderr.lines() {
                tracing::error!("[{}] {}", command.program_name(), line);
            }
            return Err(SensorNetError::CommandFailed {
                program: command.program_name(),
                status: output.status,
                stderr: output.stderr,
            });
        }
        Ok(())
    }

    fn ensure_not_project_root(&self, venv: &Path) -> Result<()> {
        let root = resolve(self.config.project_root());
        if root.starts_with(resolve(venv)) {
            return Err(SensorNetError::InvalidConfigValueError {
                field: "environment.venv_dir".to_string(),
                value: self.config.venv_dir().display().to_string(),
                reason: "Environment directory cannot be or contain the project root".to_string(),
            });
        }
        Ok(())
    }
}

/// How to reach pip inside an environment.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Installer {
    Pip(PathBuf),
    PythonModule(PathBuf),
}

impl Installer {
    fn into_command(self, cwd: &Path) -> CommandSpec {
        match self {
            Self::Pip(pip) => CommandSpec::new(pip, cwd),
            Self::PythonModule(python) => CommandSpec::new(python, cwd).arg("-m").arg("pip"),
        }
    }
}

fn find_installer(venv: &Path) -> Option<Installer> {
    let pip_candidates = [venv.join("bin").join("pip"), venv.join("Scripts").join("pip.exe")];
    if let Some(pip) = pip_candidates.into_iter().find(|p| p.is_file()) {
        return Some(Installer::Pip(pip));
    }
    let python_candidates = [
        venv.join("bin").join("python"),
        venv.join("Scripts").join("python.exe"),
    ];
    python_candidates
        .into_iter()
        .find(|p| p.exists())
        .map(Installer::PythonModule)
}

/// Canonical form of `path`. Missing trailing components are appended to their
/// canonical parent, and `.`/`..` are folded lexically.
fn resolve(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => resolve(parent).join(name),
        _ => {
            let mut folded = PathBuf::new();
            for component in path.components() {
                match component {
                    Component::CurDir => {}
                    Component::ParentDir => {
                        folded.pop();
                    }
                    other => folded.push(other),
                }
            }
            folded
        }
    }
}

fn is_bytecode(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| BYTECODE_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

fn remove_ignoring_missing(path: &Path, dir: bool) -> Result<bool> {
    let result = if dir {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
