//! # Ivy Telemetry
//!
//! Logging setup for services built on Ivy. Ivy itself only emits
//! `tracing` events and spans; this crate installs the subscriber that
//! formats and filters them.

#![doc(html_root_url = "https://docs.rs/ivy-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod logging;

// Re-export main types at crate root
pub use error::TelemetryError;
pub use logging::{create_env_filter, init_logging, LogConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
