//! Write channel over any transport

use std::sync::Arc;
use std::time::Duration;

use super::serial::SerialChannel;
use super::tcp::TcpChannel;
use super::udp::UdpChannel;
use super::{ConfirmationSupervisor, PlcResponseObserver, TransportError};
use crate::core::config::{TransportConfig, Trigger};
use crate::core::protocols::fins::BitAddress;

/// Transport kind, for logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Serial,
    Udp,
    Tcp,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Serial => write!(f, "serial"),
            Self::Udp => write!(f, "udp"),
            Self::Tcp => write!(f, "tcp"),
        }
    }
}

#[derive(Debug)]
pub enum TransportChannel {
    Serial(SerialChannel),
    Udp(UdpChannel),
    Tcp(TcpChannel),
}

impl TransportChannel {
    /// Open the link described by `config`; TCP links handshake here
    pub async fn open(
        config: &TransportConfig,
        response_timeout: Duration,
        observer: Arc<dyn PlcResponseObserver>,
    ) -> Result<Self, TransportError> {
        let supervisor = ConfirmationSupervisor::new(config.key(), response_timeout, observer);
        match config {
            TransportConfig::Serial(c) => SerialChannel::open(c, supervisor).map(Self::Serial),
            TransportConfig::Udp(c) => UdpChannel::open(c, supervisor).await.map(Self::Udp),
            TransportConfig::Tcp(c) => TcpChannel::open(c, supervisor).await.map(Self::Tcp),
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Serial(c) => c.key(),
            Self::Udp(c) => c.key(),
            Self::Tcp(c) => c.key(),
        }
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Serial(_) => TransportKind::Serial,
            Self::Udp(_) => TransportKind::Udp,
            Self::Tcp(_) => TransportKind::Tcp,
        }
    }

    /// Write one bit and start the confirmation wait; returns once the
    /// command has been handed to the link
    pub async fn send_bit_write(
        &self,
        trigger: Trigger,
        address: BitAddress,
        on: bool,
    ) -> Result<(), TransportError> {
        match self {
            Self::Serial(c) => c.send_bit_write(trigger, address, on).await,
            Self::Udp(c) => c.send_bit_write(trigger, address, on).await,
            Self::Tcp(c) => c.send_bit_write(trigger, address, on).await,
        }
    }

    /// Cancel pending confirmation waits and release the handle; repeatable
    pub async fn close(&self) {
        match self {
            Self::Serial(c) => c.close().await,
            Self::Udp(c) => c.close().await,
            Self::Tcp(c) => c.close().await,
        }
    }

    pub fn supervisor(&self) -> &ConfirmationSupervisor {
        match self {
            Self::Serial(c) => c.supervisor(),
            Self::Udp(c) => c.supervisor(),
            Self::Tcp(c) => c.supervisor(),
        }
    }
}

impl From<SerialChannel> for TransportChannel {
    fn from(channel: SerialChannel) -> Self {
        Self::Serial(channel)
    }
}

impl From<UdpChannel> for TransportChannel {
    fn from(channel: UdpChannel) -> Self {
        Self::Udp(channel)
    }
}

impl From<TcpChannel> for TransportChannel {
    fn from(channel: TcpChannel) -> Self {
        Self::Tcp(channel)
    }
}
