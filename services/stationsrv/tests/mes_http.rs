//! HTTP MES client against a loopback axum server

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

mod common;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Uri};
use axum::Router;
use parking_lot::Mutex;

use common::{lot, station_config};
use stationsrv::core::channels::{ConnectionManager, SignalDispatcher};
use stationsrv::core::config::{
    BatchMaterialLot, ConfigPersister, MemoryConfigStore, MesConfig, Side,
};
use stationsrv::core::ledger::MaterialUsageLedger;
use stationsrv::core::mes::{HttpMesClient, MesClient};
use stationsrv::core::transport::LoggingObserver;
use stationsrv::{Outcome, WorkflowEngine};

#[derive(Debug, Clone)]
struct Request {
    path: String,
    query: String,
    token: String,
    body: String,
}

#[derive(Default)]
struct FakeMes {
    unknown_sn: bool,
    bind_reply: Option<String>,
    requests: Mutex<Vec<Request>>,
}

impl FakeMes {
    fn requests(&self) -> Vec<Request> {
        self.requests.lock().clone()
    }

    fn request(&self, suffix: &str) -> Request {
        self.requests()
            .into_iter()
            .find(|r| r.path.ends_with(suffix))
            .unwrap()
    }
}

async fn answer(
    State(mes): State<Arc<FakeMes>>,
    headers: HeaderMap,
    uri: Uri,
    body: String,
) -> String {
    let path = uri.path().to_string();
    mes.requests.lock().push(Request {
        path: path.clone(),
        query: uri.query().unwrap_or_default().to_string(),
        token: headers
            .get("token")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string(),
        body,
    });

    if path.ends_with("/getOneBySn") {
        if mes.unknown_sn {
            return r#"{"RESULT":"FAIL","MESSAGE":"没有查询到数据","CODE":1}"#.to_string();
        }
        return r#"{"RESULT":"PASS","MESSAGE":"ok","CODE":0,"DATA":{"shoporder":"SO-7"}}"#
            .to_string();
    }
    if path.ends_with("/getSettingShoporder") {
        return r#"{"RESULT":"PASS","MESSAGE":"ok","DATA":{"shoporder":"SO-9"}}"#.to_string();
    }
    if path.ends_with("/bobcat") {
        return mes
            .bind_reply
            .clone()
            .unwrap_or_else(|| "0 SFC_OK".to_string());
    }
    r#"{"RESULT":"PASS","MESSAGE":"ok"}"#.to_string()
}

async fn serve(mes: Arc<FakeMes>) -> SocketAddr {
    let app = Router::new().fallback(answer).with_state(mes);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn mes_config(addr: SocketAddr) -> MesConfig {
    station_config(&format!("http://{addr}/metal/api/me/"), Vec::new()).mes
}

#[tokio::test]
async fn test_lookup_sends_token_and_parses_reply() {
    let fake = Arc::new(FakeMes::default());
    let addr = serve(fake.clone()).await;
    let client = HttpMesClient::new(&mes_config(addr)).unwrap();

    let response = client.lookup_sn("FM71234").await;
    assert!(response.is_pass());
    assert_eq!(response.shoporder(), Some("SO-7"));

    let request = fake.request("/getOneBySn");
    assert_eq!(request.path, "/metal/api/me/mesSn/getOneBySn");
    assert_eq!(request.query, "sn=FM71234");
    assert_eq!(request.token, "secret");
}

#[tokio::test]
async fn test_bind_failure_status_line() {
    let fake = Arc::new(FakeMes {
        bind_reply: Some("2 SFC_FATAL_ERROR comp_sn1 not found".to_string()),
        ..FakeMes::default()
    });
    let addr = serve(fake.clone()).await;
    let client = HttpMesClient::new(&mes_config(addr)).unwrap();

    let response = client
        .bind_lots("SN1", "DEV-L", "ST-L", &["A1".to_string()])
        .await;
    assert!(!response.is_pass());
    assert_eq!(response.message(), "SFC_FATAL_ERROR comp_sn1 not found");
    assert_eq!(fake.request("/bobcat").path, "/fatp/exi/me/bobcat");
}

#[tokio::test]
async fn test_unreachable_mes_is_a_failed_response() {
    let config = MesConfig {
        request_timeout_secs: 2,
        ..mes_config("127.0.0.1:9".parse().unwrap())
    };
    let client = HttpMesClient::new(&config).unwrap();

    let response = client.start_process("SN1", "SO-1", "ST-L", "DEV-L").await;
    assert!(!response.is_pass());
    assert!(!response.message().is_empty());
}

fn engine(
    addr: SocketAddr,
    bind_all: bool,
    recruit: bool,
    lots: Vec<BatchMaterialLot>,
) -> WorkflowEngine {
    let mut mes_config = mes_config(addr);
    mes_config.bind_all_lots = bind_all;
    mes_config.enable_product_recruit = recruit;

    let client = Arc::new(HttpMesClient::new(&mes_config).unwrap());
    let connections = Arc::new(ConnectionManager::new(
        std::time::Duration::from_millis(50),
        Arc::new(LoggingObserver),
    ));
    let dispatcher = SignalDispatcher::new(Default::default(), connections);
    let persister = ConfigPersister::new(Arc::new(MemoryConfigStore::default()));

    WorkflowEngine::new(
        mes_config,
        client,
        Arc::new(MaterialUsageLedger::new(lots)),
        dispatcher,
        persister,
    )
    .with_mac_provider(Arc::new(|| "00:1A:2B:3C:4D:5E".to_string()))
}

#[tokio::test]
async fn test_bind_all_sends_comp_sn_in_lot_order() {
    let fake = Arc::new(FakeMes::default());
    let addr = serve(fake.clone()).await;
    let lots = vec![
        lot(1, Side::Left, "A1", 10.0),
        lot(2, Side::Right, "B2", 10.0),
        lot(3, Side::Left, "C3", 10.0),
    ];
    let engine = engine(addr, true, false, lots);

    assert_eq!(engine.process_scan(Side::Left, "SN1").await, Outcome::Ok);

    let bind = fake.request("/bobcat");
    assert_eq!(
        bind.query,
        "c=ASSEMBLY_COMP_SN&station_id=DEV-L&sn=SN1&test_station_name=ST-L\
         &comp_sn1=A1&comp_sn2=B2&comp_sn3=C3"
    );
    let paths: Vec<String> = fake.requests().into_iter().map(|r| r.path).collect();
    assert_eq!(
        paths,
        [
            "/metal/api/me/mesSn/getOneBySn",
            "/metal/api/me/mesFlowControl/start",
            "/fatp/exi/me/bobcat",
            "/metal/api/me/mesFlowControl/complete",
        ]
    );
    assert_eq!(
        fake.request("/complete").query,
        "sn=SN1&shoporder=SO-7&processName=ST-L&resourceCode=DEV-L"
    );
}

#[tokio::test]
async fn test_unknown_sn_is_recruited_over_http() {
    let fake = Arc::new(FakeMes {
        unknown_sn: true,
        ..FakeMes::default()
    });
    let addr = serve(fake.clone()).await;
    let engine = engine(addr, false, true, vec![lot(1, Side::Right, "R1", 10.0)]);

    assert_eq!(engine.process_scan(Side::Right, "SN2").await, Outcome::Ok);

    let shop_order = fake.request("/getSettingShoporder");
    assert_eq!(
        shop_order.query,
        "processName=ST-R&resourceCode=00%3A1A%3A2B%3A3C%3A4D%3A5E"
    );

    let recruit = fake.request("/recruitShoporderSn");
    let body: serde_json::Value = serde_json::from_str(&recruit.body).unwrap();
    assert_eq!(body["sn"], "SN2");
    assert_eq!(body["checkSnRule"], "true");
    assert_eq!(body["processName"], "ST-R");
    assert_eq!(body["shoporder"], "SO-9");

    assert!(fake.request("/start").query.contains("shoporder=SO-9"));
}
