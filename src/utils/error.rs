use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SensorNetError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[cfg(feature = "serial")]
    #[error("Serial port error: {0}")]
    SerialError(#[from] tokio_serial::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Isolated environment not found at {}", .path.display())]
    EnvironmentMissing { path: PathBuf },

    #[error("Dependency manifest not found at {}", .path.display())]
    ManifestMissing { path: PathBuf },

    #[error("Interpreter '{interpreter}' is not available")]
    InterpreterUnavailable { interpreter: String },

    #[error("Command '{program}' exited with {status}")]
    CommandFailed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("Malformed frame: {message}")]
    FrameError { message: String },

    #[error("Protocol error: {message}")]
    ProtocolError { message: String },

    #[error("Timed out after {after:?} waiting for {what}")]
    Timeout { what: String, after: Duration },

    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("Radio link closed")]
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Environment,
    Radio,
    Protocol,
    Usage,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl SensorNetError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::ConfigValidationError { .. } => ErrorCategory::Configuration,
            Self::EnvironmentMissing { .. }
            | Self::ManifestMissing { .. }
            | Self::InterpreterUnavailable { .. }
            | Self::CommandFailed { .. } => ErrorCategory::Environment,
            #[cfg(feature = "serial")]
            Self::SerialError(_) => ErrorCategory::Radio,
            Self::Disconnected | Self::Timeout { .. } => ErrorCategory::Radio,
            Self::FrameError { .. } | Self::ProtocolError { .. } => ErrorCategory::Protocol,
            Self::InvalidArgument { .. } => ErrorCategory::Usage,
            Self::IoError(_) | Self::SerializationError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Protocol => ErrorSeverity::Medium,
            ErrorCategory::Radio => match self {
                Self::Timeout { .. } => ErrorSeverity::Medium,
                _ => ErrorSeverity::Critical,
            },
            ErrorCategory::Configuration | ErrorCategory::Environment | ErrorCategory::Usage => {
                ErrorSeverity::High
            }
            ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            Self::EnvironmentMissing { .. } => {
                "Create the environment first with `sensornet venv`".to_string()
            }
            Self::ManifestMissing { path } => {
                format!("Add a dependency manifest at {}", path.display())
            }
            Self::InterpreterUnavailable { interpreter } => format!(
                "Install {} or point --interpreter at an available one",
                interpreter
            ),
            Self::CommandFailed { .. } => "Inspect the tool output above; \
                `sensornet reset` then `sensornet venv` rebuilds the environment"
                .to_string(),
            #[cfg(feature = "serial")]
            Self::SerialError(_) => {
                "Check that the radio is plugged in and --device names its serial port".to_string()
            }
            Self::Disconnected => "Reconnect the radio and retry".to_string(),
            Self::Timeout { .. } => {
                "The node may be out of range; raise --response-timeout or retry".to_string()
            }
            Self::ProtocolError { .. } => {
                "Query the node's IO first and only ask for payloads it reports".to_string()
            }
            Self::FrameError { .. } => {
                "Make sure the radio runs in API mode matching --no-escape".to_string()
            }
            Self::ConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::ConfigValidationError { .. } => {
                "Fix the configuration file or command line flags".to_string()
            }
            Self::InvalidArgument { .. } => "Check the arguments and retry".to_string(),
            Self::IoError(_) | Self::SerializationError(_) => {
                "Check file permissions and available disk space".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::CommandFailed {
                program, stderr, ..
            } if !stderr.trim().is_empty() => {
                format!("{} failed:\n{}", program, stderr.trim_end())
            }
            _ => self.to_string(),
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }
}

pub type Result<T> = std::result::Result<T, SensorNetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_errors_exit_with_one() {
        let err = SensorNetError::EnvironmentMissing {
            path: PathBuf::from("venv"),
        };
        assert_eq!(err.category(), ErrorCategory::Environment);
        assert_eq!(err.exit_code(), 1);
        assert!(err.recovery_suggestion().contains("venv"));
    }

    #[test]
    fn test_timeout_is_retryable() {
        let err = SensorNetError::Timeout {
            what: "IO_RESPONSE".to_string(),
            after: Duration::from_secs(1),
        };
        assert_eq!(err.severity(), ErrorSeverity::Medium);
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_command_failure_message_includes_stderr() {
        let err = SensorNetError::CommandFailed {
            program: "pip".to_string(),
            status: "exit status: 1".to_string(),
            stderr: "No matching distribution\n".to_string(),
        };
        assert_eq!(err.user_friendly_message(), "pip failed:\nNo matching distribution");
    }
}
