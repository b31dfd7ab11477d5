//! UDP write channel, binary FINS with statically configured nodes

use std::net::SocketAddr;
use std::sync::Arc;

use common::hex::format_frame;
use parking_lot::RwLock;
use tokio::net::UdpSocket;
use tracing::debug;

use super::{ConfirmationSupervisor, PlcAck, TransportError};
use crate::core::config::{Trigger, UdpConfig};
use crate::core::protocols::fins::frame::{self, NodePair};
use crate::core::protocols::fins::BitAddress;

const RECV_BUFFER: usize = 128;

pub struct UdpChannel {
    key: String,
    peer: SocketAddr,
    nodes: NodePair,
    socket: RwLock<Option<Arc<UdpSocket>>>,
    supervisor: ConfirmationSupervisor,
}

impl UdpChannel {
    /// Bind an ephemeral local port and connect it to the PLC
    pub async fn open(
        config: &UdpConfig,
        supervisor: ConfirmationSupervisor,
    ) -> Result<Self, TransportError> {
        let peer: SocketAddr = format!("{}:{}", config.ip, config.port)
            .parse()
            .map_err(|e| {
                TransportError::ConnectionFailed(format!("{}:{}: {e}", config.ip, config.port))
            })?;

        let local = if peer.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let socket = UdpSocket::bind(local).await?;
        socket
            .connect(peer)
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("{peer}: {e}")))?;

        debug!(
            "[{}] UDP ready for {} (plc node {}, pc node {})",
            supervisor.channel(),
            peer,
            config.plc_node,
            config.pc_node
        );

        Ok(Self {
            key: supervisor.channel().to_string(),
            peer,
            nodes: NodePair {
                pc_node: config.pc_node,
                plc_node: config.plc_node,
            },
            socket: RwLock::new(Some(Arc::new(socket))),
            supervisor,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub async fn send_bit_write(
        &self,
        trigger: Trigger,
        address: BitAddress,
        on: bool,
    ) -> Result<(), TransportError> {
        let socket = self.socket.read().clone().ok_or(TransportError::Closed)?;
        let command = frame::build_bit_write(self.nodes, address, on);

        socket
            .send(&command)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        debug!("[{}] TX {}", self.key, format_frame(&command));

        let wait = self.supervisor.response_timeout();
        let key = self.key.clone();
        self.supervisor.watch(trigger, async move {
            let mut buf = [0u8; RECV_BUFFER];
            match tokio::time::timeout(wait, socket.recv(&mut buf)).await {
                Ok(Ok(n)) => {
                    debug!("[{}] RX {}", key, format_frame(&buf[..n]));
                    PlcAck::from(frame::udp_reply_status(&buf[..n]))
                },
                Ok(Err(e)) => {
                    debug!("[{}] receive failed: {}", key, e);
                    PlcAck::Unconfirmed
                },
                Err(_) => PlcAck::Unconfirmed,
            }
        });

        Ok(())
    }

    pub async fn close(&self) {
        self.supervisor.shutdown().await;
        if self.socket.write().take().is_some() {
            debug!("[{}] UDP socket released", self.key);
        }
    }

    pub fn supervisor(&self) -> &ConfirmationSupervisor {
        &self.supervisor
    }
}

impl std::fmt::Debug for UdpChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpChannel")
            .field("key", &self.key)
            .field("peer", &self.peer)
            .finish()
    }
}
