pub mod network;
pub mod tasks;

pub use crate::domain::model::{CleanReport, Node, Packet, Payload, PayloadData};
pub use crate::domain::ports::{CommandRunner, EnvironmentProvider};
pub use crate::utils::error::Result;
