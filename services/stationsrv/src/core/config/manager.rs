//! Configuration loading and pre-flight validation

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use errors::{StationError, StationResult};
use figment::{
    providers::{Env, Format, Json, Toml, Yaml},
    Figment,
};
use tracing::{debug, info};

use super::types::{AppConfig, Side};
use crate::core::protocols::fins::BitAddress;

/// Environment prefix for overrides, e.g. `STATIONSRV_MES__TOKEN`
pub const ENV_PREFIX: &str = "STATIONSRV_";

/// Default configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/stationsrv.yaml";

// ============================================================================
// File formats
// ============================================================================

/// On-disk format, chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Toml,
    Json,
}

impl ConfigFormat {
    /// Extension-less paths are read as YAML
    pub fn from_path(path: &Path) -> StationResult<Self> {
        match path.extension().and_then(|s| s.to_str()).unwrap_or("yaml") {
            "yaml" | "yml" => Ok(Self::Yaml),
            "toml" => Ok(Self::Toml),
            "json" => Ok(Self::Json),
            other => Err(StationError::Configuration(format!(
                "Unsupported config format: {other}"
            ))),
        }
    }

    /// Provider for the file alone, without environment overrides
    pub fn figment(self, path: &Path) -> Figment {
        match self {
            Self::Yaml => Figment::new().merge(Yaml::file(path)),
            Self::Toml => Figment::new().merge(Toml::file(path)),
            Self::Json => Figment::new().merge(Json::file(path)),
        }
    }
}

// ============================================================================
// Config manager
// ============================================================================

#[derive(Debug)]
pub struct ConfigManager {
    config: AppConfig,
    source: Option<PathBuf>,
}

impl ConfigManager {
    /// Load a YAML, TOML or JSON file merged with `STATIONSRV_` variables
    pub fn from_file<P: AsRef<Path>>(path: P) -> StationResult<Self> {
        let path = path.as_ref();
        let figment = ConfigFormat::from_path(path)?.figment(path);

        let config = Self::extract(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))?;
        info!("Configuration loaded from {}", path.display());

        Ok(Self {
            config,
            source: Some(path.to_path_buf()),
        })
    }

    /// Load from an in-memory YAML document
    pub fn from_yaml_str(yaml: &str) -> StationResult<Self> {
        let config = Self::extract(Figment::new().merge(Yaml::string(yaml)))?;
        Ok(Self {
            config,
            source: None,
        })
    }

    pub fn from_config(config: AppConfig) -> Self {
        Self {
            config,
            source: None,
        }
    }

    fn extract(figment: Figment) -> StationResult<AppConfig> {
        figment
            .extract()
            .map_err(|e| StationError::Configuration(format!("Failed to parse config: {e}")))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn into_config(self) -> AppConfig {
        self.config
    }

    /// File the configuration came from, if any
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Pre-flight checks run before the station may start
    pub fn validate(&self) -> StationResult<()> {
        validate(&self.config)
    }
}

/// Pre-flight rules, shared by the manager and the runtime
pub fn validate(config: &AppConfig) -> StationResult<()> {
    let mes = &config.mes;
    if mes.url.trim().is_empty() {
        return Err(incomplete("MES url is not set"));
    }
    if mes.token.trim().is_empty() {
        return Err(incomplete("MES token is not set"));
    }

    if config.lots.is_empty() {
        return Err(incomplete("no batch material lot configured"));
    }
    // The ledger addresses lots by id
    let mut lot_ids = HashSet::new();
    for lot in &config.lots {
        if !lot_ids.insert(lot.id) {
            return Err(incomplete(&format!("duplicate lot id {}", lot.id)));
        }
        if lot.lot_code.trim().is_empty() {
            return Err(incomplete(&format!("{} has no lot code", lot.name())));
        }
    }

    if !mes.bind_all_lots {
        for side in [Side::Left, Side::Right] {
            let bound = config.lots.iter().any(|l| l.bound_position == side);
            let (station, _) = mes.identity(side);
            if !bound && !station.is_empty() {
                debug!("Side {} has a station but no lot, its scans will be NG", side);
            }
        }
    }

    for binding in &config.plc.signals {
        BitAddress::parse(&binding.address).map_err(|e| {
            incomplete(&format!("signal {} address invalid: {e}", binding.trigger))
        })?;
    }

    let mut keys = HashSet::new();
    for transport in config.transports() {
        let key = transport.key();
        if !keys.insert(key.clone()) {
            return Err(incomplete(&format!("duplicate link {key}")));
        }
    }

    Ok(())
}

fn incomplete(reason: &str) -> StationError {
    StationError::ConfigIncomplete(reason.to_string())
}
