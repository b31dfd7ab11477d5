//! Configuration types
//!
//! One YAML document describes the whole station: MES endpoint and station
//! identity, PLC signal bindings, batch material lots and every serial, UDP
//! and TCP link.

use std::fmt;
use std::time::Duration;

use common::logging::LoggingConfig;
use serde::{Deserialize, Serialize};

/// Default PLC confirmation wait
pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 1000;

/// Default MES request timeout
pub const DEFAULT_MES_TIMEOUT_SECS: u64 = 30;

/// Lookup message meaning "SN unknown to MES"
pub const DEFAULT_NOT_FOUND_MARKER: &str = "没有查询到数据";

/// Default FINS port for UDP and TCP
pub const DEFAULT_FINS_PORT: u16 = 9600;

// ============================================================================
// Station sides and triggers
// ============================================================================

/// Scanning side of the station
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    #[serde(rename = "L", alias = "Left", alias = "l")]
    Left,
    #[serde(rename = "R", alias = "Right", alias = "r")]
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => write!(f, "L"),
            Self::Right => write!(f, "R"),
        }
    }
}

/// Workflow outcome a PLC signal is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Trigger {
    LeftReadSuccess,
    LeftReadFailure,
    RightReadSuccess,
    RightReadFailure,
}

impl Trigger {
    /// Trigger derived from the scanning side and the MES chain verdict
    pub fn for_outcome(side: Side, success: bool) -> Self {
        match (side, success) {
            (Side::Left, true) => Self::LeftReadSuccess,
            (Side::Left, false) => Self::LeftReadFailure,
            (Side::Right, true) => Self::RightReadSuccess,
            (Side::Right, false) => Self::RightReadFailure,
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ============================================================================
// Top level
// ============================================================================

/// Complete station configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceConfig,
    pub mes: MesConfig,
    pub plc: PlcSignalConfig,
    pub lots: Vec<BatchMaterialLot>,
    pub serial_ports: Vec<SerialPortConfig>,
    pub udp: Vec<UdpConfig>,
    pub tcp: Vec<TcpConfig>,
}

impl AppConfig {
    /// Every configured link, serial first, then UDP, then TCP
    pub fn transports(&self) -> Vec<TransportConfig> {
        self.serial_ports
            .iter()
            .cloned()
            .map(TransportConfig::Serial)
            .chain(self.udp.iter().cloned().map(TransportConfig::Udp))
            .chain(self.tcp.iter().cloned().map(TransportConfig::Tcp))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub logging: LoggingConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "stationsrv".to_string(),
            logging: LoggingConfig::default(),
        }
    }
}

// ============================================================================
// MES
// ============================================================================

/// MES endpoint and station identity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MesConfig {
    /// Base URL, e.g. `http://mes.local:8080/api`
    pub url: String,
    pub token: String,
    pub left_station_name: String,
    pub left_device_code: String,
    pub right_station_name: String,
    pub right_device_code: String,
    /// Register unknown SNs against the station's assigned shop order
    pub enable_product_recruit: bool,
    /// Strip everything from the last `+` of a scanned SN
    pub remove_sn_suffix: bool,
    /// Bind every lot to each unit in one call
    pub bind_all_lots: bool,
    pub not_found_marker: String,
    pub request_timeout_secs: u64,
}

impl Default for MesConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            token: String::new(),
            left_station_name: String::new(),
            left_device_code: String::new(),
            right_station_name: String::new(),
            right_device_code: String::new(),
            enable_product_recruit: false,
            remove_sn_suffix: false,
            bind_all_lots: false,
            not_found_marker: DEFAULT_NOT_FOUND_MARKER.to_string(),
            request_timeout_secs: DEFAULT_MES_TIMEOUT_SECS,
        }
    }
}

impl MesConfig {
    /// Station name and device code of one side
    pub fn identity(&self, side: Side) -> (&str, &str) {
        match side {
            Side::Left => (&self.left_station_name, &self.left_device_code),
            Side::Right => (&self.right_station_name, &self.right_device_code),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// ============================================================================
// PLC signals
// ============================================================================

/// Bit written when a trigger fires
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalBinding {
    pub trigger: Trigger,
    /// `W<word>.<bit>`, parsed at dispatch time
    pub address: String,
    /// true writes 01, false writes 00
    #[serde(default = "default_level")]
    pub level: bool,
}

fn default_level() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlcSignalConfig {
    pub response_timeout_ms: u64,
    pub signals: Vec<SignalBinding>,
}

impl Default for PlcSignalConfig {
    fn default() -> Self {
        let bind = |trigger, address: &str| SignalBinding {
            trigger,
            address: address.to_string(),
            level: true,
        };
        Self {
            response_timeout_ms: DEFAULT_RESPONSE_TIMEOUT_MS,
            signals: vec![
                bind(Trigger::LeftReadSuccess, "W511.11"),
                bind(Trigger::LeftReadFailure, "W511.12"),
                bind(Trigger::RightReadSuccess, "W511.13"),
                bind(Trigger::RightReadFailure, "W511.14"),
            ],
        }
    }
}

impl PlcSignalConfig {
    pub fn binding(&self, trigger: Trigger) -> Option<&SignalBinding> {
        self.signals.iter().find(|s| s.trigger == trigger)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

// ============================================================================
// Batch material
// ============================================================================

/// A consumable lot bound to produced units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchMaterialLot {
    pub id: u32,
    pub bound_position: Side,
    #[serde(default = "default_true")]
    pub usage_controlled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_capacity: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_usage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_usage: Option<f64>,
    #[serde(default)]
    pub lot_code: String,
    #[serde(default = "default_true")]
    pub locked: bool,
}

fn default_true() -> bool {
    true
}

impl BatchMaterialLot {
    pub fn name(&self) -> String {
        format!("lot-{}", self.id)
    }

    /// Usage consumed per unit, 1 when unset
    pub fn effective_unit_usage(&self) -> f64 {
        self.unit_usage.unwrap_or(1.0)
    }
}

// ============================================================================
// Links
// ============================================================================

/// What a link is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommRole {
    /// SN reader of the left side
    LeftRead,
    /// SN reader of the right side
    RightRead,
    /// PLC signal output
    Write,
}

impl CommRole {
    pub fn read_side(self) -> Option<Side> {
        match self {
            Self::LeftRead => Some(Side::Left),
            Self::RightRead => Some(Side::Right),
            Self::Write => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopBits {
    One,
    Two,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parity {
    None,
    Odd,
    Even,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialPortConfig {
    pub index: u32,
    pub role: CommRole,
    pub port_name: String,
    #[serde(default = "default_baud")]
    pub baud_rate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: StopBits,
    #[serde(default = "default_parity")]
    pub parity: Parity,
}

fn default_baud() -> u32 {
    115_200
}

fn default_data_bits() -> u8 {
    8
}

fn default_stop_bits() -> StopBits {
    StopBits::One
}

fn default_parity() -> Parity {
    Parity::None
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UdpConfig {
    pub index: u32,
    #[serde(default = "default_write_role")]
    pub role: CommRole,
    pub ip: String,
    #[serde(default = "default_fins_port")]
    pub port: u16,
    #[serde(default = "default_plc_node")]
    pub plc_node: u8,
    #[serde(default = "default_pc_node")]
    pub pc_node: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TcpConfig {
    pub index: u32,
    #[serde(default = "default_write_role")]
    pub role: CommRole,
    pub ip: String,
    #[serde(default = "default_fins_port")]
    pub port: u16,
}

fn default_write_role() -> CommRole {
    CommRole::Write
}

fn default_fins_port() -> u16 {
    DEFAULT_FINS_PORT
}

fn default_plc_node() -> u8 {
    10
}

fn default_pc_node() -> u8 {
    18
}

/// A configured link of any kind
#[derive(Debug, Clone, PartialEq)]
pub enum TransportConfig {
    Serial(SerialPortConfig),
    Udp(UdpConfig),
    Tcp(TcpConfig),
}

impl TransportConfig {
    pub fn role(&self) -> CommRole {
        match self {
            Self::Serial(c) => c.role,
            Self::Udp(c) => c.role,
            Self::Tcp(c) => c.role,
        }
    }

    /// Registry key: `Serial_1`, `UDP_0`, `TCP_2`
    pub fn key(&self) -> String {
        match self {
            Self::Serial(c) => format!("Serial_{}", c.index),
            Self::Udp(c) => format!("UDP_{}", c.index),
            Self::Tcp(c) => format!("TCP_{}", c.index),
        }
    }

    pub fn is_write(&self) -> bool {
        self.role() == CommRole::Write
    }
}
