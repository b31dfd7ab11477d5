//! TCP write channel, FINS/TCP with node handshake

use std::sync::Arc;
use std::time::Duration;

use common::hex::format_frame;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info};

use super::{ConfirmationSupervisor, PlcAck, TransportError};
use crate::core::config::{TcpConfig, Trigger};
use crate::core::protocols::fins::frame::{self, NodePair};
use crate::core::protocols::fins::BitAddress;

/// Connection attempt limit
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

const RECV_BUFFER: usize = 128;

pub struct TcpChannel {
    key: String,
    nodes: NodePair,
    reader: Arc<Mutex<Option<OwnedReadHalf>>>,
    writer: Mutex<Option<OwnedWriteHalf>>,
    supervisor: ConfirmationSupervisor,
}

impl TcpChannel {
    /// Connect and negotiate node numbers; the channel only exists once the
    /// handshake succeeded
    pub async fn open(
        config: &TcpConfig,
        supervisor: ConfirmationSupervisor,
    ) -> Result<Self, TransportError> {
        let addr = format!("{}:{}", config.ip, config.port);
        let key = supervisor.channel().to_string();
        debug!("[{}] connecting to {}", key, addr);

        let mut stream = match timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(TransportError::ConnectionFailed(format!("{addr}: {e}")));
            },
            Err(_) => {
                return Err(TransportError::Timeout(format!("connect to {addr}")));
            },
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!("[{}] TCP_NODELAY not set: {}", key, e);
        }

        let nodes = handshake(&mut stream, &key, supervisor.response_timeout()).await?;
        info!(
            "[{}] FINS/TCP handshake with {} done (pc node {}, plc node {})",
            key, addr, nodes.pc_node, nodes.plc_node
        );

        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            key,
            nodes,
            reader: Arc::new(Mutex::new(Some(read_half))),
            writer: Mutex::new(Some(write_half)),
            supervisor,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn nodes(&self) -> NodePair {
        self.nodes
    }

    pub async fn send_bit_write(
        &self,
        trigger: Trigger,
        address: BitAddress,
        on: bool,
    ) -> Result<(), TransportError> {
        let command = frame::wrap_tcp(&frame::build_bit_write(self.nodes, address, on));
        self.discard_stale_replies();
        {
            let mut guard = self.writer.lock().await;
            let writer = guard.as_mut().ok_or(TransportError::Closed)?;
            writer
                .write_all(&command)
                .await
                .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        }
        debug!("[{}] TX {}", self.key, format_frame(&command));

        let reader = Arc::clone(&self.reader);
        let wait = self.supervisor.response_timeout();
        let key = self.key.clone();
        self.supervisor.watch(trigger, async move {
            let mut guard = reader.lock().await;
            let Some(read_half) = guard.as_mut() else {
                return PlcAck::Unconfirmed;
            };
            let mut buf = [0u8; RECV_BUFFER];
            match timeout(wait, read_half.read(&mut buf)).await {
                Ok(Ok(0)) => {
                    debug!("[{}] connection closed by PLC", key);
                    PlcAck::Unconfirmed
                },
                Ok(Ok(n)) => {
                    debug!("[{}] RX {}", key, format_frame(&buf[..n]));
                    PlcAck::from(frame::tcp_reply_status(&buf[..n]))
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

    /// Drop replies that arrived after their wait gave up
    ///
    /// Every request carries the same SID, so a late reply cannot be told
    /// apart from the answer to the next write once that write is on the wire.
    fn discard_stale_replies(&self) {
        // Held by a wait that is still reading its own reply
        let Ok(guard) = self.reader.try_lock() else {
            return;
        };
        let Some(read_half) = guard.as_ref() else {
            return;
        };
        let mut buf = [0u8; RECV_BUFFER];
        while let Ok(n) = read_half.try_read(&mut buf) {
            if n == 0 {
                break;
            }
            debug!("[{}] late reply dropped: {}", self.key, format_frame(&buf[..n]));
        }
    }

    pub async fn close(&self) {
        self.supervisor.shutdown().await;
        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(e) = writer.shutdown().await {
                debug!("[{}] error during TCP shutdown: {}", self.key, e);
            }
        }
        self.reader.lock().await.take();
    }

    pub fn supervisor(&self) -> &ConfirmationSupervisor {
        &self.supervisor
    }
}

impl std::fmt::Debug for TcpChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpChannel")
            .field("key", &self.key)
            .field("nodes", &self.nodes)
            .finish()
    }
}

/// Exchange the node address request and reply
async fn handshake(
    stream: &mut TcpStream,
    key: &str,
    wait: Duration,
) -> Result<NodePair, TransportError> {
    let request = frame::handshake_request();
    stream.write_all(&request).await?;
    debug!("[{}] TX {}", key, format_frame(&request));

    let mut reply = Vec::with_capacity(RECV_BUFFER);
    let mut buf = [0u8; RECV_BUFFER];
    let collect = async {
        while reply.len() < frame::HANDSHAKE_REPLY_LEN {
            let n = stream.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            reply.extend_from_slice(&buf[..n]);
        }
        Ok::<(), std::io::Error>(())
    };
    let outcome = timeout(wait, collect).await;
    match outcome {
        Ok(result) => result?,
        Err(_) if reply.is_empty() => {
            return Err(TransportError::Timeout("handshake reply".to_string()));
        },
        Err(_) => {},
    }
    debug!("[{}] RX {}", key, format_frame(&reply));

    Ok(frame::parse_handshake_reply(&reply)?)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::core::config::CommRole;
    use crate::core::protocols::fins::frame::HandshakeError;
    use crate::core::transport::RecordingObserver;
    use tokio::net::TcpListener;

    fn handshake_reply(status: u8, pc: u8, plc: u8) -> Vec<u8> {
        let mut reply = vec![0u8; 24];
        reply[..4].copy_from_slice(b"FINS");
        reply[7] = 0x10;
        reply[11] = 0x01;
        reply[15] = status;
        reply[19] = pc;
        reply[23] = plc;
        reply
    }

    async fn config_for(listener: &TcpListener) -> TcpConfig {
        TcpConfig {
            index: 1,
            role: CommRole::Write,
            ip: "127.0.0.1".to_string(),
            port: listener.local_addr().unwrap().port(),
        }
    }

    fn supervisor(observer: Arc<RecordingObserver>) -> ConfirmationSupervisor {
        ConfirmationSupervisor::new("TCP_1", Duration::from_millis(300), observer)
    }

    #[tokio::test]
    async fn test_handshake_then_confirmed_write() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = config_for(&listener).await;

        let plc = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut req = [0u8; 20];
            socket.read_exact(&mut req).await.unwrap();
            assert_eq!(&req[..4], b"FINS");
            socket.write_all(&handshake_reply(0, 0x22, 0x01)).await.unwrap();

            let mut cmd = [0u8; 35];
            socket.read_exact(&mut cmd).await.unwrap();
            let mut reply = cmd[..16].to_vec();
            reply.extend_from_slice(&[0xC0, 0, 2, 0, 0x22, 0, 0, 0x01, 0, 0x10, 1, 2, 0, 0]);
            socket.write_all(&reply).await.unwrap();
            cmd
        });

        let observer = Arc::new(RecordingObserver::default());
        let channel = TcpChannel::open(&config, supervisor(observer.clone()))
            .await
            .unwrap();
        assert_eq!(
            channel.nodes(),
            NodePair {
                pc_node: 0x22,
                plc_node: 0x01
            }
        );

        channel
            .send_bit_write(
                Trigger::RightReadSuccess,
                BitAddress::new(511, 13).unwrap(),
                true,
            )
            .await
            .unwrap();

        let cmd = plc.await.unwrap();
        assert_eq!(&cmd[..4], b"FINS");
        assert_eq!(&cmd[4..8], &[0, 0, 0, 27]);
        // Negotiated nodes end up in the header
        assert_eq!(cmd[16 + 4], 0x01);
        assert_eq!(cmd[16 + 7], 0x22);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(observer.acks_for("TCP_1"), vec![PlcAck::Confirmed]);
        channel.close().await;
    }

    #[tokio::test]
    async fn test_late_reply_is_not_credited_to_next_write() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = config_for(&listener).await;

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut req = [0u8; 20];
            socket.read_exact(&mut req).await.unwrap();
            socket.write_all(&handshake_reply(0, 0x22, 0x01)).await.unwrap();

            // First write answered with a rejection, after its wait gave up
            let mut cmd = [0u8; 35];
            socket.read_exact(&mut cmd).await.unwrap();
            tokio::time::sleep(Duration::from_millis(250)).await;
            let mut late = cmd[..16].to_vec();
            late.extend_from_slice(&[0xC0, 0, 2, 0, 0x22, 0, 0, 0x01, 0, 0x10, 1, 2, 0x04, 0x01]);
            socket.write_all(&late).await.unwrap();

            socket.read_exact(&mut cmd).await.unwrap();
            let mut reply = cmd[..16].to_vec();
            reply.extend_from_slice(&[0xC0, 0, 2, 0, 0x22, 0, 0, 0x01, 0, 0x10, 1, 2, 0, 0]);
            socket.write_all(&reply).await.unwrap();
            // Keep the connection open until the client is done
            let _ = socket.read(&mut cmd).await;
        });

        let observer = Arc::new(RecordingObserver::default());
        let supervisor =
            ConfirmationSupervisor::new("TCP_1", Duration::from_millis(100), observer.clone());
        let channel = TcpChannel::open(&config, supervisor).await.unwrap();
        let address = BitAddress::new(511, 11).unwrap();

        channel
            .send_bit_write(Trigger::LeftReadSuccess, address, true)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;
        channel
            .send_bit_write(Trigger::LeftReadFailure, address, true)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(
            observer.acks(),
            vec![
                (Trigger::LeftReadSuccess, "TCP_1".to_string(), PlcAck::Unconfirmed),
                (Trigger::LeftReadFailure, "TCP_1".to_string(), PlcAck::Confirmed),
            ]
        );
        channel.close().await;
    }

    #[tokio::test]
    async fn test_rejected_handshake_fails_open() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = config_for(&listener).await;

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut req = [0u8; 20];
            socket.read_exact(&mut req).await.unwrap();
            socket.write_all(&handshake_reply(0x21, 0, 0)).await.unwrap();
        });

        let observer = Arc::new(RecordingObserver::default());
        let err = TcpChannel::open(&config, supervisor(observer))
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::Handshake(HandshakeError::Rejected(0x21)));
    }

    #[tokio::test]
    async fn test_short_handshake_reply_fails_open() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = config_for(&listener).await;

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut req = [0u8; 20];
            socket.read_exact(&mut req).await.unwrap();
            socket.write_all(b"FINS\0\0\0\x08").await.unwrap();
        });

        let observer = Arc::new(RecordingObserver::default());
        let err = TcpChannel::open(&config, supervisor(observer))
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::Handshake(HandshakeError::TooShort(8)));
    }
}
