//! Trigger to PLC bit fan-out
//!
//! A trigger resolves to one signal binding; its bit write goes to every open
//! write channel at once. Nothing here fails the caller: missing bindings, bad
//! addresses, an empty channel set and per-channel send errors are logged and
//! reported in the returned [`DispatchReport`].

use std::sync::Arc;

use errors::StationError;
use futures::future::join_all;
use tracing::{debug, info, warn};

use super::ConnectionManager;
use crate::core::config::{PlcSignalConfig, Trigger};
use crate::core::protocols::fins::BitAddress;
use crate::core::transport::PlcAck;

/// What happened to one `send`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchReport {
    /// Trigger has no binding
    Unmapped,
    /// Binding address does not parse
    InvalidAddress(String),
    /// No open write channel
    NoChannels,
    /// Handed to the channels; keys of those that refused the command
    Sent {
        accepted: Vec<String>,
        failed: Vec<String>,
    },
}

impl DispatchReport {
    pub fn accepted(&self) -> &[String] {
        match self {
            Self::Sent { accepted, .. } => accepted,
            _ => &[],
        }
    }

    pub fn failed(&self) -> &[String] {
        match self {
            Self::Sent { failed, .. } => failed,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone)]
pub struct SignalDispatcher {
    signals: Arc<PlcSignalConfig>,
    connections: Arc<ConnectionManager>,
}

impl SignalDispatcher {
    pub fn new(signals: PlcSignalConfig, connections: Arc<ConnectionManager>) -> Self {
        Self {
            signals: Arc::new(signals),
            connections,
        }
    }

    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    /// Write the bit bound to `trigger` on every open write channel
    ///
    /// Returns once every channel accepted or refused the command; PLC
    /// confirmations are supervised by the channels.
    pub async fn send(&self, trigger: Trigger) -> DispatchReport {
        let Some(binding) = self.signals.binding(trigger) else {
            info!("No PLC signal bound to {}", trigger);
            return DispatchReport::Unmapped;
        };

        let address = match BitAddress::parse(&binding.address) {
            Ok(address) => address,
            Err(e) => {
                warn!("Signal {} not sent: {} [{}]", trigger, e, e.error_code());
                return DispatchReport::InvalidAddress(binding.address.clone());
            },
        };

        let channels = self.connections.write_channels();
        if channels.is_empty() {
            let e = StationError::ChannelUnavailable("no open write channel".to_string());
            warn!("Signal {} ({} = {}) not sent: {}", trigger, address, binding.level, e);
            return DispatchReport::NoChannels;
        }

        debug!(
            "Sending {} ({} = {}) to {} channels",
            trigger,
            address,
            u8::from(binding.level),
            channels.len()
        );

        let level = binding.level;
        let sends = channels.iter().map(|channel| async move {
            let result = channel.send_bit_write(trigger, address, level).await;
            (channel, result)
        });

        let mut accepted = Vec::new();
        let mut failed = Vec::new();
        for (channel, result) in join_all(sends).await {
            match result {
                Ok(()) => accepted.push(channel.key().to_string()),
                Err(e) => {
                    channel
                        .supervisor()
                        .report(trigger, PlcAck::SendFailed(e.to_string()));
                    failed.push(channel.key().to_string());
                },
            }
        }

        DispatchReport::Sent { accepted, failed }
    }
}
