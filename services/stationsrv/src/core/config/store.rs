//! Configuration persistence
//!
//! The ledger mutates lots at runtime; every change is written back through a
//! [`ConfigStore`]. Only the `lots` section is replaced: the rest of the
//! document stays as it was written, so environment overrides merged at load
//! time never reach the file. Writes are last-write-wins.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use errors::{StationError, StationResult};
use parking_lot::Mutex;
use tracing::debug;

use super::manager::ConfigFormat;
use super::types::{AppConfig, BatchMaterialLot};

/// Key of the lot list in every format
const LOTS_KEY: &str = "lots";

#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn load(&self) -> StationResult<AppConfig>;

    /// Replace the lot list, leaving everything else untouched
    async fn save_lots(&self, lots: &[BatchMaterialLot]) -> StationResult<()>;

    fn name(&self) -> &str;
}

// ============================================================================
// Lot persistence
// ============================================================================

/// Writes the current lot state through a store
#[derive(Clone)]
pub struct ConfigPersister {
    store: Arc<dyn ConfigStore>,
}

impl ConfigPersister {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }

    pub async fn persist(&self, lots: Vec<BatchMaterialLot>) -> StationResult<()> {
        self.store.save_lots(&lots).await
    }

    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }
}

impl std::fmt::Debug for ConfigPersister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigPersister")
            .field("store", &self.store.name())
            .finish()
    }
}

// ============================================================================
// Configuration file
// ============================================================================

/// The configuration file the station was started from
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
    format: ConfigFormat,
    // Read-modify-write of the document, one writer at a time
    write_lock: Arc<tokio::sync::Mutex<()>>,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> StationResult<Self> {
        let path = path.into();
        let format = ConfigFormat::from_path(&path)?;
        Ok(Self {
            path,
            format,
            write_lock: Arc::new(tokio::sync::Mutex::new(())),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> ConfigFormat {
        self.format
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn read_document(&self) -> StationResult<String> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("{} not found, starting a new document", self.path.display());
                Ok(String::new())
            },
            Err(e) => Err(e.into()),
        }
    }

    /// Swap the lot list inside `text`, in the file's own format
    fn replace_lots(&self, text: &str, lots: &[BatchMaterialLot]) -> StationResult<String> {
        let blank = text.trim().is_empty();
        match self.format {
            ConfigFormat::Yaml => {
                let mut doc: serde_yaml::Value = if blank {
                    serde_yaml::Value::Mapping(Default::default())
                } else {
                    serde_yaml::from_str(text)?
                };
                let lots = serde_yaml::to_value(lots).map_err(serialization)?;
                doc.as_mapping_mut()
                    .ok_or_else(|| not_a_table(&self.path))?
                    .insert(serde_yaml::Value::from(LOTS_KEY), lots);
                serde_yaml::to_string(&doc).map_err(serialization)
            },
            ConfigFormat::Toml => {
                let mut doc: toml::Table = if blank {
                    toml::Table::new()
                } else {
                    toml::from_str(text)
                        .map_err(|e| StationError::Deserialization(e.to_string()))?
                };
                let lots = toml::Value::try_from(lots).map_err(serialization)?;
                doc.insert(LOTS_KEY.to_string(), lots);
                toml::to_string_pretty(&doc).map_err(serialization)
            },
            ConfigFormat::Json => {
                let mut doc: serde_json::Value = if blank {
                    serde_json::Value::Object(Default::default())
                } else {
                    serde_json::from_str(text)?
                };
                let lots = serde_json::to_value(lots)?;
                doc.as_object_mut()
                    .ok_or_else(|| not_a_table(&self.path))?
                    .insert(LOTS_KEY.to_string(), lots);
                Ok(serde_json::to_string_pretty(&doc)?)
            },
        }
    }
}

fn serialization(e: impl std::fmt::Display) -> StationError {
    StationError::Serialization(e.to_string())
}

fn not_a_table(path: &Path) -> StationError {
    StationError::Configuration(format!("{} is not a key/value document", path.display()))
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn load(&self) -> StationResult<AppConfig> {
        let text = tokio::fs::read_to_string(&self.path).await?;
        match self.format {
            ConfigFormat::Yaml => Ok(serde_yaml::from_str(&text)?),
            ConfigFormat::Toml => {
                toml::from_str(&text).map_err(|e| StationError::Deserialization(e.to_string()))
            },
            ConfigFormat::Json => Ok(serde_json::from_str(&text)?),
        }
    }

    async fn save_lots(&self, lots: &[BatchMaterialLot]) -> StationResult<()> {
        let _guard = self.write_lock.lock().await;
        let text = self.replace_lots(&self.read_document().await?, lots)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        // Readers never observe a half-written file
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, text).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!("{} lot(s) saved to {}", lots.len(), self.path.display());
        Ok(())
    }

    fn name(&self) -> &str {
        match self.format {
            ConfigFormat::Yaml => "yaml",
            ConfigFormat::Toml => "toml",
            ConfigFormat::Json => "json",
        }
    }
}

// ============================================================================
// In memory
// ============================================================================

/// Keeps the configuration in memory, lots replaced on every save
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    current: Mutex<AppConfig>,
    saves: Mutex<usize>,
}

impl MemoryConfigStore {
    pub fn new(config: AppConfig) -> Self {
        Self {
            current: Mutex::new(config),
            saves: Mutex::new(0),
        }
    }

    pub fn snapshot(&self) -> AppConfig {
        self.current.lock().clone()
    }

    pub fn save_count(&self) -> usize {
        *self.saves.lock()
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn load(&self) -> StationResult<AppConfig> {
        Ok(self.snapshot())
    }

    async fn save_lots(&self, lots: &[BatchMaterialLot]) -> StationResult<()> {
        self.current.lock().lots = lots.to_vec();
        *self.saves.lock() += 1;
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::core::config::types::Side;
    use crate::core::config::ConfigManager;

    fn lot(id: u32, remaining: f64) -> BatchMaterialLot {
        BatchMaterialLot {
            id,
            bound_position: Side::Left,
            usage_controlled: true,
            package_capacity: Some(100),
            unit_usage: Some(1.0),
            remaining_usage: Some(remaining),
            lot_code: format!("PKG-{id}"),
            locked: true,
        }
    }

    #[tokio::test]
    async fn test_yaml_lots_replaced_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("station.yaml");
        std::fs::write(
            &path,
            "mes:\n  url: http://mes.local\n  token: file-token\nlots:\n  - id: 1\n    bound_position: L\n    lot_code: PKG-1\n    remaining_usage: 10\n",
        )
        .unwrap();

        let store = FileConfigStore::new(&path).unwrap();
        store.save_lots(&[lot(1, 9.0)]).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.mes.url, "http://mes.local");
        assert_eq!(loaded.mes.token, "file-token");
        assert_eq!(loaded.lots, vec![lot(1, 9.0)]);
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn test_toml_file_stays_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stationsrv.toml");
        std::fs::write(
            &path,
            r#"
[mes]
url = "http://mes.local/api"
token = "file-token"

[[lots]]
id = 1
bound_position = "R"
lot_code = "PKG-1"
remaining_usage = 10.0
"#,
        )
        .unwrap();

        let store = FileConfigStore::new(&path).unwrap();
        assert_eq!(store.name(), "toml");
        let mut updated = lot(1, 7.5);
        updated.bound_position = Side::Right;
        updated.unit_usage = None;
        store.save_lots(&[updated.clone()]).await.unwrap();

        // The service must still start from the rewritten file
        let reloaded = ConfigManager::from_file(&path).unwrap().into_config();
        assert_eq!(reloaded.mes.token, "file-token");
        assert_eq!(reloaded.lots, vec![updated]);
    }

    #[tokio::test]
    async fn test_json_file_stays_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stationsrv.json");
        std::fs::write(
            &path,
            r#"{"mes": {"url": "http://mes.local/api", "token": "file-token"}, "lots": []}"#,
        )
        .unwrap();

        let store = FileConfigStore::new(&path).unwrap();
        store.save_lots(&[lot(2, 3.0)]).await.unwrap();

        let reloaded = ConfigManager::from_file(&path).unwrap().into_config();
        assert_eq!(reloaded.mes.url, "http://mes.local/api");
        assert_eq!(reloaded.lots[0].remaining_usage, Some(3.0));
    }

    #[tokio::test]
    async fn test_missing_file_gets_lots_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(dir.path().join("nested").join("station.yaml")).unwrap();

        store.save_lots(&[lot(1, 10.0)]).await.unwrap();
        store.save_lots(&[lot(1, 9.0)]).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.lots[0].remaining_usage, Some(9.0));
        assert!(loaded.mes.token.is_empty());
    }

    #[test]
    fn test_unsupported_store_format() {
        let err = FileConfigStore::new("station.ini").unwrap_err();
        assert!(matches!(err, StationError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_persister_replaces_lots_only() {
        let mut base = AppConfig::default();
        base.mes.token = "secret".to_string();
        base.lots.push(lot(1, 10.0));
        let store = Arc::new(MemoryConfigStore::new(base));

        let persister = ConfigPersister::new(store.clone());
        persister.persist(vec![lot(1, 7.0)]).await.unwrap();

        let saved = store.snapshot();
        assert_eq!(saved.mes.token, "secret");
        assert_eq!(saved.lots[0].remaining_usage, Some(7.0));
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.name(), "memory");
    }
}
