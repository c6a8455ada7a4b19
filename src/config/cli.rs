use crate::config::toml_config::TomlConfig;
use crate::config::{Settings, DEFAULT_CONFIG_FILE};
use crate::utils::error::Result;
use crate::utils::validation::Validate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Parser)]
#[command(name = "sensornet")]
#[command(about = "ZigBee sensor network client and project environment tasks")]
pub struct CliConfig {
    /// Path to a TOML configuration file (defaults to ./sensornet.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Project root the environment tasks operate in
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    #[arg(long, global = true)]
    pub venv_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    pub interpreter: Option<String>,

    /// Dependency manifest installed by `depends`
    #[arg(long, global = true)]
    pub manifest: Option<PathBuf>,

    /// Serial device of the coordinator radio
    #[arg(long, global = true)]
    pub device: Option<String>,

    #[arg(long, global = true)]
    pub baud: Option<u32>,

    /// Seconds to wait for node discovery answers
    #[arg(long, global = true)]
    pub discovery_timeout: Option<u64>,

    /// Seconds to wait for a node to answer a request
    #[arg(long, global = true)]
    pub response_timeout: Option<u64>,

    /// Radio runs in API mode 1 (no escaping)
    #[arg(long, global = true)]
    pub no_escape: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Remove compiled bytecode and __pycache__ directories
    Clean,
    /// Install the dependency manifest into the existing environment
    Depends,
    /// Create the environment and install dependencies into it
    Venv,
    /// Delete the environment directory
    Reset,
    /// Discover the sensor network and query every node (default)
    Run {
        /// Print the survey as JSON
        #[arg(long)]
        json: bool,
    },
}

impl CliConfig {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run { json: false })
    }

    /// Loads the TOML file (if any), applies flags on top and validates the result.
    pub fn settings(&self) -> Result<Settings> {
        let mut settings = Settings::default();

        let file = match &self.config {
            Some(path) => Some(TomlConfig::from_file(path)?),
            None => {
                let root = self.root.clone().unwrap_or_else(|| PathBuf::from("."));
                let candidate = root.join(DEFAULT_CONFIG_FILE);
                if candidate.is_file() {
                    tracing::debug!("Loading configuration from {}", candidate.display());
                    Some(TomlConfig::from_file(candidate)?)
                } else {
                    None
                }
            }
        };
        if let Some(file) = file {
            file.validate()?;
            file.apply_to(&mut settings);
        }

        self.apply_to(&mut settings);
        settings.validate()?;
        Ok(settings)
    }

    fn apply_to(&self, settings: &mut Settings) {
        if let Some(root) = &self.root {
            settings.environment.project_root = root.clone();
        }
        if let Some(venv_dir) = &self.venv_dir {
            settings.environment.venv_dir = venv_dir.clone();
        }
        if let Some(interpreter) = &self.interpreter {
            settings.environment.interpreter = interpreter.clone();
        }
        if let Some(manifest) = &self.manifest {
            settings.environment.manifest = manifest.clone();
        }
        if let Some(device) = &self.device {
            settings.network.device = device.clone();
        }
        if let Some(baud) = self.baud {
            settings.network.baud = baud;
        }
        if let Some(secs) = self.discovery_timeout {
            settings.network.discovery_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.response_timeout {
            settings.network.response_timeout = Duration::from_secs(secs);
        }
        if self.no_escape {
            settings.network.escaped = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_default_command_is_run() {
        let cli = CliConfig::parse_from(["sensornet"]);
        assert_eq!(cli.command(), Command::Run { json: false });
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = CliConfig::parse_from(["sensornet", "venv", "--interpreter", "python3.12"]);
        assert_eq!(cli.command(), Command::Venv);
        assert_eq!(cli.interpreter.as_deref(), Some("python3.12"));
    }

    #[test]
    fn test_flags_override_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"[network]\nbaud = 57600\ndevice = \"/dev/ttyS1\"\n")
            .unwrap();

        let cli = CliConfig::parse_from([
            "sensornet",
            "--config",
            path.to_str().unwrap(),
            "--baud",
            "115200",
            "--no-escape",
        ]);
        let settings = cli.settings().unwrap();

        assert_eq!(settings.network.baud, 115200);
        assert_eq!(settings.network.device, "/dev/ttyS1");
        assert!(!settings.network.escaped);
    }

    #[test]
    fn test_default_file_is_picked_up_from_root() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(DEFAULT_CONFIG_FILE),
            "[environment]\nvenv_dir = \".venv\"\n",
        )
        .unwrap();

        let cli = CliConfig::parse_from([
            "sensornet",
            "reset",
            "--root",
            dir.path().to_str().unwrap(),
        ]);
        let settings = cli.settings().unwrap();

        assert_eq!(settings.environment.venv_dir, PathBuf::from(".venv"));
        assert_eq!(settings.environment.project_root, dir.path());
    }

    #[test]
    fn test_missing_explicit_config_fails() {
        let cli = CliConfig::parse_from(["sensornet", "--config", "/nonexistent/sensornet.toml"]);
        assert!(cli.settings().is_err());
    }
}
