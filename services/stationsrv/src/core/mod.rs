//! Core station components
//!
//! - **`config`** - configuration types, loading, validation and persistence
//! - **`protocols`** - FINS and HostLink framing
//! - **`transport`** - serial, UDP and TCP links with confirmation supervision
//! - **`channels`** - write channel ownership and signal fan-out
//! - **`ledger`** - remaining usage of batch material lots
//! - **`mes`** - MES client interface and its HTTP implementation
//! - **`workflow`** - the per-SN state machine
//! - **`bootstrap`** - CLI arguments and logging setup
//!
//! Nothing here fails the process once the station is running: MES errors end
//! a scan with NG, link errors are logged by the dispatcher, and only material
//! exhaustion halts intake.

pub mod bootstrap;
pub mod channels;
pub mod config;
pub mod ledger;
pub mod mes;
pub mod protocols;
pub mod transport;
pub mod workflow;
