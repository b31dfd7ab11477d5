//! Station controller basic library
//!
//! Provides functions shared by the station services:
//! - logging bootstrap with daily rolling files
//! - graceful shutdown signal handling
//! - startup banner and service metadata
//! - hex rendering for wire-frame dumps
//! - host network information

pub mod hex;
pub mod logging;
pub mod service_bootstrap;
pub mod shutdown;
pub mod system_info;

// Re-export common dependencies
pub use anyhow;
pub use tokio;

pub use logging::{LogConfig, LoggingConfig};
pub use service_bootstrap::ServiceInfo;
