pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;
pub mod xbee;

#[cfg(feature = "cli")]
pub use config::{CliConfig, Command};

pub use adapters::ProcessRunner;
pub use app::{survey, survey_and_stop, SurveyReport};
pub use config::{EnvironmentSettings, Settings};
pub use crate::core::{network::NetworkSettings, network::SensorNetwork, tasks::EnvTasks};
pub use domain::model::{CleanReport, Node, Packet, Payload, PayloadData};
pub use utils::error::{Result, SensorNetError};
