//! SimpleOBS Common Utilities
//!
//! Shared infrastructure for all SimpleOBS crates:
//! - Error types and result aliases
//! - Stream clock and frame pacing for the real-time loop
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
