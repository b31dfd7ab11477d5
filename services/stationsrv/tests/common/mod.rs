//! Shared fixtures for the integration tests
#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use stationsrv::core::config::{AppConfig, BatchMaterialLot, FileConfigStore, Side};
use stationsrv::core::mes::{MesClient, MesResponse};

/// MES double answering from a fixed script and recording every call
pub struct ScriptedMes {
    pub lookup: MesResponse,
    pub shop_order: MesResponse,
    pub recruit: MesResponse,
    pub start: MesResponse,
    pub bind: MesResponse,
    pub complete: MesResponse,
    calls: Mutex<Vec<String>>,
}

impl ScriptedMes {
    pub fn passing() -> Self {
        Self {
            lookup: MesResponse::pass("ok").with_data(json!({"shoporder": "SO-1"})),
            shop_order: MesResponse::pass("ok").with_data(json!({"shoporder": "SO-9"})),
            recruit: MesResponse::pass("ok"),
            start: MesResponse::pass("ok"),
            bind: MesResponse::pass("SFC_OK"),
            complete: MesResponse::pass("ok"),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl MesClient for ScriptedMes {
    async fn lookup_sn(&self, sn: &str) -> MesResponse {
        self.record(format!("lookup {sn}"));
        self.lookup.clone()
    }

    async fn get_assigned_shop_order(&self, station: &str, device_mac: &str) -> MesResponse {
        self.record(format!("shop_order {station} {device_mac}"));
        self.shop_order.clone()
    }

    async fn recruit_sn(&self, sn: &str, station: &str, shoporder: &str) -> MesResponse {
        self.record(format!("recruit {sn} {station} {shoporder}"));
        self.recruit.clone()
    }

    async fn start_process(&self, sn: &str, shoporder: &str, _: &str, _: &str) -> MesResponse {
        self.record(format!("start {sn} {shoporder}"));
        self.start.clone()
    }

    async fn bind_lots(&self, sn: &str, _: &str, _: &str, lot_codes: &[String]) -> MesResponse {
        self.record(format!("bind {sn} {}", lot_codes.join(",")));
        self.bind.clone()
    }

    async fn complete_process(&self, sn: &str, shoporder: &str, _: &str, _: &str) -> MesResponse {
        self.record(format!("complete {sn} {shoporder}"));
        self.complete.clone()
    }
}

pub fn lot(id: u32, side: Side, code: &str, remaining: f64) -> BatchMaterialLot {
    BatchMaterialLot {
        id,
        bound_position: side,
        usage_controlled: true,
        package_capacity: Some(100),
        unit_usage: Some(1.0),
        remaining_usage: Some(remaining),
        lot_code: code.to_string(),
        locked: true,
    }
}

/// A configuration that passes pre-flight validation and opens no link
pub fn station_config(mes_url: &str, lots: Vec<BatchMaterialLot>) -> AppConfig {
    let mut config = AppConfig::default();
    config.mes.url = mes_url.to_string();
    config.mes.token = "secret".to_string();
    config.mes.left_station_name = "ST-L".to_string();
    config.mes.left_device_code = "DEV-L".to_string();
    config.mes.right_station_name = "ST-R".to_string();
    config.mes.right_device_code = "DEV-R".to_string();
    config.lots = lots;
    config
}

/// Write `config` as the station's YAML file and open a store over it
pub fn file_store(path: &Path, config: &AppConfig) -> Arc<FileConfigStore> {
    std::fs::write(path, serde_yaml::to_string(config).unwrap()).unwrap();
    Arc::new(FileConfigStore::new(path).unwrap())
}
