//! MES client over HTTP
//!
//! Every request is a POST with the `Token` header. JSON endpoints live under
//! the configured URL; the bind endpoint lives at the root of its host and
//! answers with a plain-text status line.

use async_trait::async_trait;
use errors::{StationError, StationResult};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, Url};
use serde_json::json;
use tracing::{debug, info, warn};

use super::{parse_bind_status, MesClient, MesResponse};
use crate::core::config::MesConfig;

const TOKEN_HEADER: &str = "Token";
const BIND_PATH: &str = "/fatp/exi/me/bobcat";
const BIND_COMMAND: &str = "ASSEMBLY_COMP_SN";

#[derive(Debug, Clone)]
pub struct HttpMesClient {
    client: Client,
    base_url: String,
    bind_url: String,
}

impl HttpMesClient {
    pub fn new(config: &MesConfig) -> StationResult<Self> {
        let mut headers = HeaderMap::new();
        let token = HeaderValue::from_str(config.token.trim()).map_err(|e| {
            StationError::InvalidConfig {
                field: "mes.token".to_string(),
                reason: e.to_string(),
            }
        })?;
        headers.insert(TOKEN_HEADER, token);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout())
            .build()?;

        let base_url = config.url.trim().trim_end_matches('/').to_string();
        let bind_url = format!("{}{}", origin_of(&base_url)?, BIND_PATH);

        Ok(Self {
            client,
            base_url,
            bind_url,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// POST with query parameters and an optional JSON body, body text back
    async fn post(
        &self,
        url: &str,
        query: &[(String, String)],
        body: Option<serde_json::Value>,
    ) -> Result<String, String> {
        let mut request = self.client.post(url).query(query);
        if let Some(body) = &body {
            request = request.json(body);
        }

        info!("→ POST {} {:?}", url, query);
        if let Some(body) = &body {
            debug!("  body: {}", body);
        }

        let response = request.send().await.map_err(|e| e.to_string())?;
        let status = response.status();
        let text = response.text().await.map_err(|e| e.to_string())?;
        info!("← {} {}", status, text);
        Ok(text)
    }

    async fn post_json(
        &self,
        path: &str,
        query: &[(&str, &str)],
        body: Option<serde_json::Value>,
    ) -> MesResponse {
        let url = self.endpoint(path);
        let query = owned(query);
        match self.post(&url, &query, body).await {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                warn!("MES reply from {} is not valid JSON: {}", url, e);
                MesResponse::fail(format!("invalid response: {e}"))
            }),
            Err(e) => {
                warn!("MES request to {} failed: {}", url, e);
                MesResponse::fail(e)
            },
        }
    }
}

fn owned(query: &[(&str, &str)]) -> Vec<(String, String)> {
    query
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// `scheme://host[:port]` of a URL
fn origin_of(url: &str) -> StationResult<String> {
    let parsed = Url::parse(url).map_err(|e| StationError::InvalidConfig {
        field: "mes.url".to_string(),
        reason: format!("{url}: {e}"),
    })?;
    let host = parsed.host_str().ok_or_else(|| StationError::InvalidConfig {
        field: "mes.url".to_string(),
        reason: format!("{url} has no host"),
    })?;

    Ok(match parsed.port() {
        Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
        None => format!("{}://{}", parsed.scheme(), host),
    })
}

#[async_trait]
impl MesClient for HttpMesClient {
    async fn lookup_sn(&self, sn: &str) -> MesResponse {
        self.post_json("mesSn/getOneBySn", &[("sn", sn)], None)
            .await
    }

    async fn get_assigned_shop_order(&self, station: &str, device_mac: &str) -> MesResponse {
        self.post_json(
            "mesResource/getSettingShoporder",
            &[("processName", station), ("resourceCode", device_mac)],
            None,
        )
        .await
    }

    async fn recruit_sn(&self, sn: &str, station: &str, shoporder: &str) -> MesResponse {
        let body = json!({
            "sn": sn,
            "checkSnRule": "true",
            "processName": station,
            "shoporder": shoporder,
        });
        self.post_json("mesShoporderStatistic/recruitShoporderSn", &[], Some(body))
            .await
    }

    async fn start_process(
        &self,
        sn: &str,
        shoporder: &str,
        station: &str,
        device: &str,
    ) -> MesResponse {
        self.post_json(
            "mesFlowControl/start",
            &[
                ("sn", sn),
                ("shoporder", shoporder),
                ("processName", station),
                ("resourceCode", device),
            ],
            None,
        )
        .await
    }

    async fn bind_lots(
        &self,
        sn: &str,
        device: &str,
        station: &str,
        lot_codes: &[String],
    ) -> MesResponse {
        if lot_codes.is_empty() {
            return MesResponse::fail("lot list empty");
        }

        let mut query = owned(&[
            ("c", BIND_COMMAND),
            ("station_id", device),
            ("sn", sn),
            ("test_station_name", station),
        ]);
        query.extend(
            lot_codes
                .iter()
                .enumerate()
                .map(|(i, code)| (format!("comp_sn{}", i + 1), code.clone())),
        );
        info!("Binding {} lots to {}: {}", lot_codes.len(), sn, lot_codes.join(", "));

        match self.post(&self.bind_url, &query, None).await {
            Ok(text) => parse_bind_status(&text),
            Err(e) => {
                warn!("MES bind request failed: {}", e);
                MesResponse::fail(e)
            },
        }
    }

    async fn complete_process(
        &self,
        sn: &str,
        shoporder: &str,
        station: &str,
        device: &str,
    ) -> MesResponse {
        self.post_json(
            "mesFlowControl/complete",
            &[
                ("sn", sn),
                ("shoporder", shoporder),
                ("processName", station),
                ("resourceCode", device),
            ],
            None,
        )
        .await
    }
}
