//! Per-scan state

use std::fmt;

use errors::StationError;
use uuid::Uuid;

use crate::core::config::{BatchMaterialLot, Side};

/// Terminal result of one scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    Ng,
    /// A target lot ran out; the station halts after this scan
    Stopped,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::Ng => write!(f, "NG"),
            Self::Stopped => write!(f, "STOPPED"),
        }
    }
}

/// Everything known about the scan being processed
#[derive(Debug, Clone)]
pub struct WorkflowContext {
    pub run_id: Uuid,
    pub sn: String,
    pub side: Side,
    pub station_name: String,
    pub device_code: String,
    pub shoporder: Option<String>,
    pub targets: Vec<BatchMaterialLot>,
}

impl WorkflowContext {
    pub fn new(side: Side, sn: &str, station_name: &str, device_code: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            sn: sn.to_string(),
            side,
            station_name: station_name.to_string(),
            device_code: device_code.to_string(),
            shoporder: None,
            targets: Vec::new(),
        }
    }

    pub fn shoporder(&self) -> &str {
        self.shoporder.as_deref().unwrap_or_default()
    }

    pub fn lot_codes(&self) -> Vec<String> {
        self.targets.iter().map(|lot| lot.lot_code.clone()).collect()
    }
}

/// Steps of the scan state machine, in execution order
#[derive(Debug)]
pub enum State {
    ResolveTargets,
    Lookup,
    /// SN unknown to MES, register it against the station's shop order
    Recruit,
    Start,
    Bind,
    /// Usage is consumed whatever the bind verdict was
    Consume { bind_failure: Option<StationError> },
    Complete,
    CheckExhaustion { failure: Option<StationError> },
    Done(Verdict),
}

impl State {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ResolveTargets => "resolve_targets",
            Self::Lookup => "lookup",
            Self::Recruit => "recruit",
            Self::Start => "start",
            Self::Bind => "bind",
            Self::Consume { .. } => "consume",
            Self::Complete => "complete",
            Self::CheckExhaustion { .. } => "check_exhaustion",
            Self::Done(_) => "done",
        }
    }
}

/// How a scan ended and which signal it reports
#[derive(Debug)]
pub struct Verdict {
    pub outcome: Outcome,
    /// Whether the MES chain passed; selects the success or failure trigger
    pub success: bool,
    pub error: Option<StationError>,
}

impl Verdict {
    pub fn ok() -> Self {
        Self {
            outcome: Outcome::Ok,
            success: true,
            error: None,
        }
    }

    pub fn ng(error: StationError) -> Self {
        Self {
            outcome: Outcome::Ng,
            success: false,
            error: Some(error),
        }
    }

    pub fn stopped(success: bool, error: StationError) -> Self {
        Self {
            outcome: Outcome::Stopped,
            success,
            error: Some(error),
        }
    }
}
