//! Station Controller Library (stationsrv)
//!
//! Drives one assembly station: every scanned serial number is pushed through
//! the MES chain, the batch material it consumed is booked against its lot,
//! and the verdict is written to the PLC as a single bit.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐    ┌─────────────────┐    ┌─────────────────┐
//! │  Scanner ports  │───►│ WorkflowEngine  │───►│   MES (HTTP)    │
//! │  (SnIngestion)  │    │ (per-SN states) │    │                 │
//! └─────────────────┘    └─────────────────┘    └─────────────────┘
//!                                 │
//!                 ┌───────────────┴───────────────┐
//!                 ▼                               ▼
//!        ┌─────────────────┐            ┌─────────────────┐
//!        │  Usage Ledger   │            │SignalDispatcher │
//!        │ (lots, persist) │            │   (fan-out)     │
//!        └─────────────────┘            └─────────────────┘
//!                                                 │
//!                               ┌─────────────────┼─────────────────┐
//!                               ▼                 ▼                 ▼
//!                          Serial_N           UDP_N             TCP_N
//!                          HostLink           FINS              FINS/TCP
//! ```
//!
//! # Outcomes
//!
//! Each SN ends in exactly one of:
//!
//! - **OK** - lookup, start, bind and complete all passed
//! - **NG** - the MES rejected a step, or no lot serves the side
//! - **STOPPED** - a target lot ran out; intake halts after this SN
//!
//! # Configuration
//!
//! ```yaml
//! mes:
//!   url: "http://10.0.0.5:20007/metal/api/me"
//!   token: "..."
//!   left_station_name: "ASSY-01"
//!   left_device_code: "ASSY-01-L"
//!   bind_all_lots: false
//! plc:
//!   response_timeout_ms: 1000
//! lots:
//!   - id: 1
//!     bound_position: L
//!     lot_code: "PKG-0001"
//!     unit_usage: 1.0
//!     remaining_usage: 500
//! udp:
//!   - index: 1
//!     ip: "192.168.250.1"
//! ```

pub mod core;
pub mod runtime;

pub use crate::core::config::{AppConfig, ConfigManager};
pub use crate::core::workflow::{Outcome, WorkflowEngine};
pub use crate::runtime::StationRuntime;
