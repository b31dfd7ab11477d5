//! Runtime orchestration: lifecycle and SN intake

pub mod ingest;
pub mod lifecycle;

pub use ingest::{normalize_scan, strip_sn_suffix, ScanEvent, SnIngestion};
pub use lifecycle::StationRuntime;
