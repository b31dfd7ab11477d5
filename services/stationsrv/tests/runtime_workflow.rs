//! Runtime level workflow tests: ordering, persistence and the exhaustion halt

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{file_store, lot, station_config, ScriptedMes};
use stationsrv::core::config::{ConfigManager, ConfigStore, Side};
use stationsrv::core::mes::MesResponse;
use stationsrv::{Outcome, StationRuntime};

#[tokio::test]
async fn test_bind_failure_is_booked_before_ng() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stationsrv.yaml");

    let mut mes = ScriptedMes::passing();
    mes.bind = MesResponse::fail("SFC_FATAL_ERROR comp_sn1 unknown");
    let mes = Arc::new(mes);

    let mut config = station_config(
        "http://mes.local/api",
        vec![lot(1, Side::Left, "PKG-1", 10.0)],
    );
    let store = file_store(&path, &config);
    // Overridden at load time, e.g. from STATIONSRV_MES__TOKEN
    config.mes.token = "from-env".to_string();
    let runtime = StationRuntime::new(config, mes.clone(), store.clone());
    runtime.start().await.unwrap();

    let outcome = runtime.submit(Side::Left, "SN1").unwrap().await.unwrap();
    assert_eq!(outcome, Outcome::Ng);

    // On disk before the NG was returned
    let saved = store.load().await.unwrap();
    assert_eq!(saved.lots[0].remaining_usage, Some(9.0));
    assert_eq!(saved.mes.token, "secret");
    assert!(!mes.calls().iter().any(|c| c.starts_with("complete")));

    runtime.stop().await;

    // The station restarts from what was written
    let reloaded = ConfigManager::from_file(&path).unwrap();
    reloaded.validate().unwrap();
    assert_eq!(reloaded.config().lots[0].remaining_usage, Some(9.0));
    assert!(!std::fs::read_to_string(&path).unwrap().contains("from-env"));
}

#[tokio::test]
async fn test_exhaustion_halts_intake() {
    let dir = tempfile::tempdir().unwrap();
    let mes = Arc::new(ScriptedMes::passing());

    let config = station_config(
        "http://mes.local/api",
        vec![lot(1, Side::Right, "PKG-1", 1.0)],
    );
    let store = file_store(&dir.path().join("stationsrv.yaml"), &config);
    let runtime = StationRuntime::new(config, mes.clone(), store.clone());
    runtime.start().await.unwrap();

    let outcome = runtime.submit(Side::Right, "SN1").unwrap().await.unwrap();
    assert_eq!(outcome, Outcome::Stopped);

    tokio::time::timeout(Duration::from_secs(1), runtime.halted())
        .await
        .unwrap();
    assert!(runtime.submit(Side::Right, "SN2").is_none());

    runtime.stop().await;
    let saved = store.load().await.unwrap();
    assert_eq!(saved.lots[0].remaining_usage, Some(0.0));
    assert_eq!(mes.calls().len(), 4);
}

#[tokio::test]
async fn test_concurrent_scans_share_the_ledger() {
    let dir = tempfile::tempdir().unwrap();
    let mes = Arc::new(ScriptedMes::passing());

    let mut config = station_config(
        "http://mes.local/api",
        vec![
            lot(1, Side::Left, "PKG-L", 100.0),
            lot(2, Side::Right, "PKG-R", 100.0),
        ],
    );
    config.mes.bind_all_lots = true;
    let store = file_store(&dir.path().join("stationsrv.yaml"), &config);
    let runtime = StationRuntime::new(config, mes, store.clone());
    runtime.start().await.unwrap();

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let side = if i % 2 == 0 { Side::Left } else { Side::Right };
            runtime.submit(side, format!("SN{i}")).unwrap()
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap(), Outcome::Ok);
    }

    assert_eq!(runtime.ledger().get(1).unwrap().remaining_usage, Some(80.0));
    assert_eq!(runtime.ledger().get(2).unwrap().remaining_usage, Some(80.0));

    runtime.stop().await;
    let saved = store.load().await.unwrap();
    assert_eq!(saved.lots[1].remaining_usage, Some(80.0));
}
