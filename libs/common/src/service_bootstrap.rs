//! Service bootstrap utilities
//!
//! Startup banner and the standard logging setup for station services.

use crate::logging::{self, LogConfig, LoggingConfig};
use tracing::{info, Level};

/// Service metadata for startup
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    /// Service name (e.g., "stationsrv")
    pub name: String,
    /// Service version from Cargo.toml
    pub version: String,
    /// Service description
    pub description: String,
}

impl ServiceInfo {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: description.into(),
        }
    }
}

/// Print startup banner
pub fn print_startup_banner(service: &ServiceInfo) {
    let banner = r#"
 ███████╗████████╗ █████╗ ████████╗██╗ ██████╗ ███╗   ██╗
 ██╔════╝╚══██╔══╝██╔══██╗╚══██╔══╝██║██╔═══██╗████╗  ██║
 ███████╗   ██║   ███████║   ██║   ██║██║   ██║██╔██╗ ██║
 ╚════██║   ██║   ██╔══██║   ██║   ██║██║   ██║██║╚██╗██║
 ███████║   ██║   ██║  ██║   ██║   ██║╚██████╔╝██║ ╚████║
 ╚══════╝   ╚═╝   ╚═╝  ╚═╝   ╚═╝   ╚═╝ ╚═════╝ ╚═╝  ╚═══╝
            "#;

    info!("{}", banner);
    info!(" {} v{}", service.name.to_uppercase(), service.version);
    info!(" {}", service.description);
    info!("");
}

/// Initialize logging for a service with standard configuration
///
/// Log root directory priority:
/// 1. STATIONSRV_LOG_DIR environment variable
/// 2. `logging.dir` from the configuration file
/// 3. Default "logs"
pub fn init_logging(
    service: &ServiceInfo,
    console_level: Level,
    no_color: bool,
    logging_config: Option<&LoggingConfig>,
) -> anyhow::Result<()> {
    crate::logging::init_log_root(logging_config.map(|c| c.dir.as_str()));

    let defaults = LogConfig::default();
    let log_config = LogConfig {
        service_name: service.name.clone(),
        log_dir: crate::logging::get_log_root().join(&service.name),
        console_level,
        enable_ansi: !no_color,
        enable_json: false,
        max_file_size: logging_config
            .map(|c| c.max_file_size_mb * 1024 * 1024)
            .unwrap_or(defaults.max_file_size),
        archive_after_days: logging_config
            .map(|c| c.archive_after_days)
            .or(defaults.archive_after_days),
    };

    logging::init_with_config(log_config).map_err(|e| anyhow::anyhow!("{}", e))?;

    Ok(())
}
