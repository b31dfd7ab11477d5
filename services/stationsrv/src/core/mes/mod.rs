//! MES client interface
//!
//! Every call answers with a [`MesResponse`]; transport and decode failures
//! are folded into a FAIL response so the workflow only ever branches on
//! PASS or not.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use http::HttpMesClient;

/// Status the bind endpoint answers with on success
pub const BIND_OK_STATUS: &str = "SFC_OK";

/// Reply shape shared by the MES JSON endpoints
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MesResponse {
    #[serde(rename = "RESULT", default)]
    pub result: String,
    #[serde(rename = "MESSAGE", default)]
    pub message: Option<String>,
    #[serde(rename = "CODE", default)]
    pub code: Option<serde_json::Value>,
    #[serde(rename = "DATA", default)]
    pub data: Option<serde_json::Value>,
}

impl MesResponse {
    pub fn pass(message: impl Into<String>) -> Self {
        Self {
            result: "PASS".to_string(),
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            result: "FAIL".to_string(),
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn is_pass(&self) -> bool {
        self.result == "PASS"
    }

    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or_default()
    }

    /// `DATA.shoporder`, when present
    pub fn shoporder(&self) -> Option<&str> {
        self.data
            .as_ref()
            .and_then(|data| data.get("shoporder"))
            .and_then(|value| value.as_str())
            .filter(|s| !s.is_empty())
    }
}

/// Parse the plain-text status line of the bind endpoint
///
/// `0 SFC_OK` passes. Anything else fails with the status token plus the
/// trailing detail, e.g. `2 SFC_FATAL_ERROR bad comp_sn1` fails with
/// `SFC_FATAL_ERROR bad comp_sn1`.
pub fn parse_bind_status(text: &str) -> MesResponse {
    let text = text.trim();
    if text.is_empty() {
        return MesResponse::fail("empty response");
    }

    let parts: Vec<&str> = text.splitn(3, ' ').collect();
    if parts.len() < 2 {
        return MesResponse::fail(text);
    }

    let code = parts[0].trim();
    let status = parts[1].trim();
    if code == "0" && status == BIND_OK_STATUS {
        return MesResponse::pass(BIND_OK_STATUS);
    }

    match parts.get(2) {
        Some(detail) => MesResponse::fail(format!("{} {}", status, detail.trim())),
        None => MesResponse::fail(status),
    }
}

/// The MES operations the workflow needs
#[async_trait]
pub trait MesClient: Send + Sync {
    async fn lookup_sn(&self, sn: &str) -> MesResponse;

    /// Shop order assigned to a station, identified by the host MAC
    async fn get_assigned_shop_order(&self, station: &str, device_mac: &str) -> MesResponse;

    async fn recruit_sn(&self, sn: &str, station: &str, shoporder: &str) -> MesResponse;

    async fn start_process(
        &self,
        sn: &str,
        shoporder: &str,
        station: &str,
        device: &str,
    ) -> MesResponse;

    /// Bind lots to the unit; `lot_codes` order becomes `comp_sn1..N`
    async fn bind_lots(
        &self,
        sn: &str,
        device: &str,
        station: &str,
        lot_codes: &[String],
    ) -> MesResponse;

    async fn complete_process(
        &self,
        sn: &str,
        shoporder: &str,
        station: &str,
        device: &str,
    ) -> MesResponse;
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_bind_status_ok() {
        let response = parse_bind_status("0 SFC_OK\r\n");
        assert!(response.is_pass());
        assert_eq!(response.message(), "SFC_OK");
    }

    #[test]
    fn test_bind_status_failure_keeps_detail() {
        let response = parse_bind_status("2 SFC_FATAL_ERROR comp_sn1 does not match the rule");
        assert!(!response.is_pass());
        assert_eq!(
            response.message(),
            "SFC_FATAL_ERROR comp_sn1 does not match the rule"
        );

        let response = parse_bind_status("1 SFC_OK");
        assert!(!response.is_pass());
        assert_eq!(response.message(), "SFC_OK");
    }

    #[test]
    fn test_bind_status_degenerate() {
        assert_eq!(parse_bind_status("   ").message(), "empty response");
        assert_eq!(parse_bind_status("garbage").message(), "garbage");
    }

    #[test]
    fn test_json_response_shape() {
        let response: MesResponse = serde_json::from_str(
            r#"{"RESULT":"PASS","MESSAGE":"ok","CODE":0,"DATA":{"shoporder":"SO-42","sn":"X"}}"#,
        )
        .unwrap();
        assert!(response.is_pass());
        assert_eq!(response.shoporder(), Some("SO-42"));

        let response: MesResponse = serde_json::from_str(r#"{"RESULT":"FAIL"}"#).unwrap();
        assert_eq!(response.message(), "");
        assert_eq!(response.shoporder(), None);
    }
}
