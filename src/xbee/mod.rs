pub mod api;
pub mod frame;

pub use api::{ApiFrame, DiscoveredNode};
pub use frame::{encode, FrameDecoder};
