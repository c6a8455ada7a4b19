#[cfg(feature = "cli")]
pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
pub use cli::{CliConfig, Command};

use crate::core::network::NetworkSettings;
use crate::domain::ports::EnvironmentProvider;
use crate::utils::error::Result;
use crate::utils::validation::{
    validate_non_empty_string, validate_path, validate_positive_number, validate_range, Validate,
};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "sensornet.toml";

/// Fully resolved settings: defaults, then the TOML file, then CLI flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub environment: EnvironmentSettings,
    pub network: NetworkSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentSettings {
    pub project_root: PathBuf,
    pub venv_dir: PathBuf,
    pub interpreter: String,
    pub manifest: PathBuf,
}

impl Default for EnvironmentSettings {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            venv_dir: PathBuf::from("venv"),
            interpreter: "python3".to_string(),
            manifest: PathBuf::from("requirements.txt"),
        }
    }
}

impl EnvironmentProvider for EnvironmentSettings {
    fn project_root(&self) -> &Path {
        &self.project_root
    }

    fn venv_dir(&self) -> &Path {
        &self.venv_dir
    }

    fn interpreter(&self) -> &str {
        &self.interpreter
    }

    fn manifest(&self) -> &Path {
        &self.manifest
    }
}

impl Validate for Settings {
    fn validate(&self) -> Result<()> {
        let env = &self.environment;
        validate_path("environment.root", &env.project_root.to_string_lossy())?;
        validate_path("environment.venv_dir", &env.venv_dir.to_string_lossy())?;
        validate_path("environment.manifest", &env.manifest.to_string_lossy())?;
        validate_non_empty_string("environment.interpreter", &env.interpreter)?;

        let net = &self.network;
        validate_non_empty_string("network.device", &net.device)?;
        validate_positive_number("network.baud", net.baud.into(), 1)?;
        validate_range(
            "network.discovery_timeout_secs",
            net.discovery_timeout.as_secs(),
            0,
            600,
        )?;
        validate_range(
            "network.response_timeout_ms",
            net.response_timeout.as_millis() as u64,
            1,
            600_000,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.environment.manifest, PathBuf::from("requirements.txt"));
        assert_eq!(settings.network.baud, 9600);
        assert!(settings.network.escaped);
    }

    #[test]
    fn test_rejects_empty_venv_dir() {
        let mut settings = Settings::default();
        settings.environment.venv_dir = PathBuf::new();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_response_timeout() {
        let mut settings = Settings::default();
        settings.network.response_timeout = Duration::ZERO;
        assert!(settings.validate().is_err());
    }
}
