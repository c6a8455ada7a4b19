use crate::config::Settings;
use crate::utils::error::{Result, SensorNetError};
use crate::utils::validation::Validate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub environment: EnvironmentConfig,
    #[serde(default)]
    pub network: NetworkConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub root: Option<PathBuf>,
    pub venv_dir: Option<PathBuf>,
    pub interpreter: Option<String>,
    pub manifest: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub device: Option<String>,
    pub baud: Option<u32>,
    pub escaped: Option<bool>,
    pub discovery_timeout_secs: Option<u64>,
    pub response_timeout_secs: Option<u64>,
}

impl TomlConfig {
    /// Loads the configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(SensorNetError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// Parses the configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| SensorNetError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Expands `${VAR}` references (e.g. `${SENSORNET_DEVICE}`) from the environment.
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| SensorNetError::ConfigError {
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// Overlays every value present in the file onto `settings`.
    pub fn apply_to(&self, settings: &mut Settings) {
        let env = &self.environment;
        if let Some(root) = &env.root {
            settings.environment.project_root = root.clone();
        }
        if let Some(venv_dir) = &env.venv_dir {
            settings.environment.venv_dir = venv_dir.clone();
        }
        if let Some(interpreter) = &env.interpreter {
            settings.environment.interpreter = interpreter.clone();
        }
        if let Some(manifest) = &env.manifest {
            settings.environment.manifest = manifest.clone();
        }

        let net = &self.network;
        if let Some(device) = &net.device {
            settings.network.device = device.clone();
        }
        if let Some(baud) = net.baud {
            settings.network.baud = baud;
        }
        if let Some(escaped) = net.escaped {
            settings.network.escaped = escaped;
        }
        if let Some(secs) = net.discovery_timeout_secs {
            settings.network.discovery_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = net.response_timeout_secs {
            settings.network.response_timeout = Duration::from_secs(secs);
        }
    }

    pub fn validate_config(&self) -> Result<()> {
        if let Some(venv_dir) = &self.environment.venv_dir {
            crate::utils::validation::validate_path(
                "environment.venv_dir",
                &venv_dir.to_string_lossy(),
            )?;
        }
        if let Some(device) = &self.network.device {
            crate::utils::validation::validate_non_empty_string("network.device", device)?;
        }
        if let Some(baud) = self.network.baud {
            crate::utils::validation::validate_positive_number("network.baud", baud.into(), 1)?;
        }
        Ok(())
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
