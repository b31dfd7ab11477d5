//! Service bootstrap
//!
//! Command-line arguments, logging setup and the `--validate` dry run.

use clap::Parser;
use tracing::{info, Level};

use common::service_bootstrap::ServiceInfo;
use errors::{StationError, StationResult};

use crate::core::config::{AppConfig, ConfigManager, DEFAULT_CONFIG_PATH};

pub const SERVICE_NAME: &str = "stationsrv";

/// Command-line arguments for stationsrv
#[derive(Parser, Debug, Clone)]
#[command(
    name = "stationsrv",
    version = env!("CARGO_PKG_VERSION"),
    about = "Station controller: MES workflow, material usage and PLC signalling",
    long_about = None
)]
pub struct Args {
    /// Configuration file (yaml, toml or json)
    #[arg(short = 'c', long, env = "STATIONSRV_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long)]
    pub log_level: Option<String>,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Validation mode - only validate configuration without starting service
    #[arg(long)]
    pub validate: bool,
}

impl Args {
    /// Console level: flag first, then the configured default
    pub fn console_level(&self, config: &AppConfig) -> Level {
        let level = self
            .log_level
            .as_deref()
            .unwrap_or(&config.service.logging.level);
        parse_level(level)
    }
}

pub fn service_info() -> ServiceInfo {
    ServiceInfo::new(
        SERVICE_NAME,
        env!("CARGO_PKG_VERSION"),
        "Station controller - MES workflow and FINS signalling",
    )
}

fn parse_level(level: &str) -> Level {
    match level.trim().to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Initialize logging from the loaded configuration
pub fn initialize_logging(
    args: &Args,
    service: &ServiceInfo,
    config: &AppConfig,
) -> StationResult<()> {
    common::service_bootstrap::init_logging(
        service,
        args.console_level(config),
        args.no_color,
        Some(&config.service.logging),
    )
    .map_err(|e| StationError::Configuration(format!("Failed to init logging: {}", e)))
}

/// Print what the configuration describes and fail on pre-flight errors
pub fn validate_configuration(manager: &ConfigManager) -> StationResult<()> {
    let config = manager.config();
    if let Some(source) = manager.source() {
        info!("Configuration: {}", source.display());
    }

    info!("MES: {}", config.mes.url);
    info!(
        "Stations: L = {} ({}), R = {} ({})",
        config.mes.left_station_name,
        config.mes.left_device_code,
        config.mes.right_station_name,
        config.mes.right_device_code
    );
    info!(
        "Bind mode: {}",
        if config.mes.bind_all_lots { "all lots" } else { "per side" }
    );

    info!("Found {} lot(s)", config.lots.len());
    for lot in &config.lots {
        info!(
            "  {} [{}] code={} remaining={:?} controlled={}",
            lot.name(),
            lot.bound_position,
            lot.lot_code,
            lot.remaining_usage,
            lot.usage_controlled
        );
    }

    let transports = config.transports();
    info!("Found {} link(s)", transports.len());
    for transport in &transports {
        info!("  {} ({:?})", transport.key(), transport.role());
    }

    manager.validate()
}
