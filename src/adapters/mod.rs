// Adapters layer: concrete implementations for external systems (processes, serial radio).

pub mod process;
#[cfg(feature = "serial")]
pub mod serial;

pub use process::ProcessRunner;
