//! Station runtime lifecycle
//!
//! ```text
//! start:  validate ─► open write channels ─► open scanner ports ─► intake
//! scan:   ScanEvent ─► submit ─► WorkflowEngine::process_scan (one task per SN)
//! stop:   stop intake ─► drain scans ─► close channels ─► persist lots
//! ```
//!
//! A scan ending in STOPPED cancels the halt token; the owner is expected to
//! call [`StationRuntime::stop`] once [`StationRuntime::halted`] resolves.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use errors::StationResult;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::ingest::{ScanEvent, SnIngestion};
use crate::core::channels::{ConnectionManager, SignalDispatcher};
use crate::core::config::{manager, AppConfig, BatchMaterialLot, ConfigPersister, ConfigStore, Side};
use crate::core::ledger::MaterialUsageLedger;
use crate::core::mes::MesClient;
use crate::core::transport::{LoggingObserver, PlcResponseObserver};
use crate::core::workflow::{MacProvider, Outcome, WorkflowEngine};

/// Pending scans queued between the readers and the workflow
const SCAN_QUEUE_DEPTH: usize = 64;

/// Upper bound on waiting for in-flight scans during stop
pub const SCAN_DRAIN_TIMEOUT: Duration = Duration::from_secs(35);

pub struct StationRuntime {
    config: Arc<AppConfig>,
    engine: WorkflowEngine,
    connections: Arc<ConnectionManager>,
    ingestion: Mutex<Option<SnIngestion>>,
    intake: CancellationToken,
    scans: TaskTracker,
    running: Arc<AtomicBool>,
    stopped: AtomicBool,
}

impl StationRuntime {
    pub fn new(config: AppConfig, mes: Arc<dyn MesClient>, store: Arc<dyn ConfigStore>) -> Self {
        Self::with_observer(config, mes, store, Arc::new(LoggingObserver))
    }

    pub fn with_observer(
        config: AppConfig,
        mes: Arc<dyn MesClient>,
        store: Arc<dyn ConfigStore>,
        observer: Arc<dyn PlcResponseObserver>,
    ) -> Self {
        let connections = Arc::new(ConnectionManager::new(
            config.plc.response_timeout(),
            observer,
        ));
        let dispatcher = SignalDispatcher::new(config.plc.clone(), Arc::clone(&connections));
        let ledger = Arc::new(MaterialUsageLedger::new(config.lots.clone()));
        let persister = ConfigPersister::new(store);
        let engine = WorkflowEngine::new(config.mes.clone(), mes, ledger, dispatcher, persister);

        Self {
            config: Arc::new(config),
            engine,
            connections,
            ingestion: Mutex::new(None),
            intake: CancellationToken::new(),
            scans: TaskTracker::new(),
            running: Arc::new(AtomicBool::new(false)),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn with_mac_provider(mut self, provider: MacProvider) -> Self {
        self.engine = self.engine.with_mac_provider(provider);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn engine(&self) -> &WorkflowEngine {
        &self.engine
    }

    pub fn ledger(&self) -> &Arc<MaterialUsageLedger> {
        self.engine.ledger()
    }

    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Validate, open links and start SN intake
    ///
    /// Fails only on pre-flight validation; links that cannot be opened are
    /// logged and left out.
    pub async fn start(&self) -> StationResult<()> {
        manager::validate(&self.config)?;

        if self.stopped.load(Ordering::SeqCst) {
            warn!("Runtime already stopped, not restarting");
            return Ok(());
        }
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("Runtime already running");
            return Ok(());
        }

        let all_open = self.connections.open_all(&self.config.transports()).await;
        if !all_open {
            warn!("Some write channels failed to open, continuing with the rest");
        }

        info!(
            "Bind mode: {}",
            if self.config.mes.bind_all_lots {
                "all lots per SN"
            } else {
                "one lot per side"
            }
        );

        let (tx, rx) = mpsc::channel(SCAN_QUEUE_DEPTH);
        let ingestion = SnIngestion::new(self.config.mes.remove_sn_suffix, tx);
        let scanners = ingestion.open_ports(&self.config.serial_ports);
        info!("Intake started with {} scanner port(s)", scanners);
        *self.ingestion.lock() = Some(ingestion);

        self.spawn_intake(rx);
        Ok(())
    }

    fn spawn_intake(&self, mut rx: mpsc::Receiver<ScanEvent>) {
        let submitter = Submitter {
            engine: self.engine.clone(),
            running: Arc::clone(&self.running),
            scans: self.scans.clone(),
        };
        let intake = self.intake.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = intake.cancelled() => break,
                    event = rx.recv() => match event {
                        Some(event) => {
                            submitter.submit(event.side, event.sn);
                        },
                        None => break,
                    },
                }
            }
            debug!("Intake loop finished");
        });
    }

    /// Run one SN through the workflow in its own task
    ///
    /// Returns `None` when the runtime is not accepting scans.
    pub fn submit(&self, side: Side, sn: impl Into<String>) -> Option<JoinHandle<Outcome>> {
        Submitter {
            engine: self.engine.clone(),
            running: Arc::clone(&self.running),
            scans: self.scans.clone(),
        }
        .submit(side, sn.into())
    }

    /// Resolves once a scan exhausted a lot
    pub async fn halted(&self) {
        self.engine.halt_token().cancelled().await;
    }

    /// Ordered shutdown, safe to call more than once
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            debug!("Runtime already stopped");
            return;
        }
        info!("Stopping station runtime...");
        self.running.store(false, Ordering::SeqCst);

        self.intake.cancel();
        let ingestion = self.ingestion.lock().take();
        if let Some(ingestion) = ingestion {
            ingestion.stop().await;
        }

        self.scans.close();
        if tokio::time::timeout(SCAN_DRAIN_TIMEOUT, self.scans.wait())
            .await
            .is_err()
        {
            warn!("{} scans still running at shutdown", self.scans.len());
        }

        self.connections.close_all().await;
        self.persist().await;
        info!("Station runtime stopped");
    }

    // ========================================================================
    // Lot maintenance
    // ========================================================================

    pub async fn replace_package(
        &self,
        lot_id: u32,
        lot_code: &str,
        capacity: u32,
    ) -> StationResult<BatchMaterialLot> {
        let lot = self.ledger().replace_package(lot_id, lot_code, capacity)?;
        self.engine
            .persister()
            .persist(self.ledger().snapshot())
            .await?;
        Ok(lot)
    }

    pub async fn set_lot_locked(&self, lot_id: u32, locked: bool) -> StationResult<()> {
        self.ledger().set_locked(lot_id, locked)?;
        self.engine
            .persister()
            .persist(self.ledger().snapshot())
            .await
    }

    async fn persist(&self) {
        let persister: &ConfigPersister = self.engine.persister();
        match persister.persist(self.ledger().snapshot()).await {
            Ok(()) => debug!("Lots persisted to {} store", persister.store().name()),
            Err(e) => error!("Lots not persisted: {} [{}]", e, e.error_code()),
        }
    }
}

impl std::fmt::Debug for StationRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StationRuntime")
            .field("running", &self.is_running())
            .field("channels", &self.connections.channel_keys())
            .field("scans", &self.scans.len())
            .finish()
    }
}

struct Submitter {
    engine: WorkflowEngine,
    running: Arc<AtomicBool>,
    scans: TaskTracker,
}

impl Submitter {
    fn submit(&self, side: Side, sn: String) -> Option<JoinHandle<Outcome>> {
        if !self.running.load(Ordering::SeqCst) {
            warn!("SN {} on side {} dropped: runtime not running", sn, side);
            return None;
        }
        if self.engine.halt_token().is_cancelled() {
            warn!("SN {} on side {} dropped: station halted", sn, side);
            return None;
        }

        let engine = self.engine.clone();
        Some(
            self.scans
                .spawn(async move { engine.process_scan(side, &sn).await }),
        )
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::core::config::MemoryConfigStore;
    use crate::core::mes::HttpMesClient;
    use errors::StationError;

    fn runtime(config: AppConfig) -> (StationRuntime, Arc<MemoryConfigStore>) {
        let mes = Arc::new(HttpMesClient::new(&config.mes).unwrap());
        let store = Arc::new(MemoryConfigStore::new(config.clone()));
        (StationRuntime::new(config, mes, store.clone()), store)
    }

    fn complete_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.mes.url = "http://127.0.0.1:9/api".to_string();
        config.mes.token = "t".to_string();
        config.lots.push(BatchMaterialLot {
            id: 1,
            bound_position: Side::Left,
            usage_controlled: true,
            package_capacity: Some(10),
            unit_usage: Some(1.0),
            remaining_usage: Some(10.0),
            lot_code: "PKG-1".to_string(),
            locked: true,
        });
        config
    }

    #[tokio::test]
    async fn test_start_rejects_incomplete_config() {
        let mut config = complete_config();
        config.lots.clear();
        let (runtime, _) = runtime(config);

        let err = runtime.start().await.unwrap_err();
        assert!(matches!(err, StationError::ConfigIncomplete(_)));
        assert!(!runtime.is_running());
    }

    #[tokio::test]
    async fn test_submit_requires_running() {
        let (runtime, _) = runtime(complete_config());
        assert!(runtime.submit(Side::Left, "SN1").is_none());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_persists() {
        let (runtime, store) = runtime(complete_config());
        runtime.start().await.unwrap();
        assert!(runtime.is_running());

        runtime.stop().await;
        runtime.stop().await;

        assert!(!runtime.is_running());
        assert!(runtime.connections().is_closed());
        assert_eq!(store.save_count(), 1);
        assert!(runtime.submit(Side::Left, "SN1").is_none());
    }

    #[tokio::test]
    async fn test_package_replacement_is_persisted() {
        let (runtime, store) = runtime(complete_config());

        assert!(runtime.replace_package(1, "PKG-2", 50).await.is_err());
        runtime.set_lot_locked(1, false).await.unwrap();
        let lot = runtime.replace_package(1, "PKG-2", 50).await.unwrap();

        assert!(lot.locked);
        let saved = store.snapshot();
        assert_eq!(saved.lots[0].lot_code, "PKG-2");
        assert_eq!(saved.lots[0].remaining_usage, Some(50.0));
        assert_eq!(saved.mes.token, "t");
    }
}
