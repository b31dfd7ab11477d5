//! PLC confirmation observers

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::PlcAck;
use crate::core::config::Trigger;

/// Receives the outcome of every bit write
pub trait PlcResponseObserver: Send + Sync {
    fn on_response(&self, trigger: Trigger, channel: &str, ack: &PlcAck);
}

/// Writes outcomes to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl PlcResponseObserver for LoggingObserver {
    fn on_response(&self, trigger: Trigger, channel: &str, ack: &PlcAck) {
        match ack {
            PlcAck::Confirmed => info!("[{}] PLC confirmed {}", channel, trigger),
            PlcAck::Unconfirmed => debug!("[{}] {} sent, unconfirmed", channel, trigger),
            PlcAck::Rejected(code) => {
                warn!("[{}] PLC rejected {}: {}", channel, trigger, code)
            },
            PlcAck::Malformed(detail) => {
                warn!("[{}] PLC reply to {} malformed: {}", channel, trigger, detail)
            },
            PlcAck::SendFailed(reason) => {
                error!("[{}] {} not sent: {}", channel, trigger, reason)
            },
        }
    }
}

/// Keeps every outcome, for dashboards and tests
#[derive(Debug, Default)]
pub struct RecordingObserver {
    acks: Mutex<Vec<(Trigger, String, PlcAck)>>,
}

impl RecordingObserver {
    pub fn acks(&self) -> Vec<(Trigger, String, PlcAck)> {
        self.acks.lock().clone()
    }

    pub fn acks_for(&self, channel: &str) -> Vec<PlcAck> {
        self.acks
            .lock()
            .iter()
            .filter(|(_, c, _)| c == channel)
            .map(|(_, _, ack)| ack.clone())
            .collect()
    }
}

impl PlcResponseObserver for RecordingObserver {
    fn on_response(&self, trigger: Trigger, channel: &str, ack: &PlcAck) {
        LoggingObserver.on_response(trigger, channel, ack);
        self.acks
            .lock()
            .push((trigger, channel.to_string(), ack.clone()));
    }
}
