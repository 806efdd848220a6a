//! Public API surface.
//!
//! Lightweight types, configuration and error definitions shared by the
//! runtime and the storage layer.

pub mod config;
pub mod error;
mod response;
pub mod types;

pub mod prelude {
    pub use super::config::{DoubleBufferConfig, FatalErrorPolicy, ShutdownPolicy};
    pub use super::error::{FlushError, FlushResult};
    pub use super::types::*;
}
