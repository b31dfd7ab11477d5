//! Serial write channel, HostLink framing

use std::io;
use std::sync::Arc;
use std::time::Duration;

use common::hex::escape_ascii_frame;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::debug;

use super::{ConfirmationSupervisor, PlcAck, TransportError};
use crate::core::config::types::{Parity, SerialPortConfig, StopBits};
use crate::core::config::Trigger;
use crate::core::protocols::fins::{hostlink, BitAddress};

/// Longest settle time before reading whatever the PLC sent back
pub const MAX_REPLY_DELAY: Duration = Duration::from_millis(200);

/// Gap after which a burst of incoming bytes is considered complete
const READ_IDLE: Duration = Duration::from_millis(20);

/// A byte stream that behaves like a serial port
pub trait SerialIo: AsyncRead + AsyncWrite + Send + Unpin {
    /// Drop whatever is pending in the driver buffers
    fn discard_buffers(&mut self) -> io::Result<()>;
}

impl SerialIo for SerialStream {
    fn discard_buffers(&mut self) -> io::Result<()> {
        tokio_serial::SerialPort::clear(self, tokio_serial::ClearBuffer::All).map_err(io::Error::from)
    }
}

impl SerialIo for tokio::io::DuplexStream {
    fn discard_buffers(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl From<StopBits> for tokio_serial::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => tokio_serial::StopBits::One,
            StopBits::Two => tokio_serial::StopBits::Two,
        }
    }
}

impl From<Parity> for tokio_serial::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => tokio_serial::Parity::None,
            Parity::Odd => tokio_serial::Parity::Odd,
            Parity::Even => tokio_serial::Parity::Even,
        }
    }
}

fn data_bits(bits: u8) -> tokio_serial::DataBits {
    match bits {
        5 => tokio_serial::DataBits::Five,
        6 => tokio_serial::DataBits::Six,
        7 => tokio_serial::DataBits::Seven,
        _ => tokio_serial::DataBits::Eight,
    }
}

/// Open the OS serial port described by `config`
pub fn open_stream(config: &SerialPortConfig) -> Result<SerialStream, TransportError> {
    tokio_serial::new(&config.port_name, config.baud_rate)
        .data_bits(data_bits(config.data_bits))
        .stop_bits(config.stop_bits.into())
        .parity(config.parity.into())
        .open_native_async()
        .map_err(|e| TransportError::ConnectionFailed(format!("{}: {e}", config.port_name)))
}

/// Read whatever arrives until the line goes quiet
pub async fn read_available<R>(io: &mut R) -> Vec<u8>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut out = Vec::new();
    let mut buf = [0u8; 256];
    loop {
        match timeout(READ_IDLE, io.read(&mut buf)).await {
            Ok(Ok(0)) | Err(_) => break,
            Ok(Ok(n)) => out.extend_from_slice(&buf[..n]),
            Ok(Err(e)) => {
                debug!("Serial read stopped: {}", e);
                break;
            },
        }
    }
    out
}

type SharedPort = Arc<Mutex<Option<Box<dyn SerialIo>>>>;

pub struct SerialChannel {
    key: String,
    port: SharedPort,
    supervisor: ConfirmationSupervisor,
}

impl SerialChannel {
    pub fn open(
        config: &SerialPortConfig,
        supervisor: ConfirmationSupervisor,
    ) -> Result<Self, TransportError> {
        let stream = open_stream(config)?;
        debug!(
            "[{}] opened {} at {} baud",
            supervisor.channel(),
            config.port_name,
            config.baud_rate
        );
        Ok(Self::from_io(Box::new(stream), supervisor))
    }

    /// Wrap an already open stream
    pub fn from_io(io: Box<dyn SerialIo>, supervisor: ConfirmationSupervisor) -> Self {
        Self {
            key: supervisor.channel().to_string(),
            port: Arc::new(Mutex::new(Some(io))),
            supervisor,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn send_bit_write(
        &self,
        trigger: Trigger,
        address: BitAddress,
        on: bool,
    ) -> Result<(), TransportError> {
        let frame = hostlink::build_bit_write(address, on);
        {
            let mut guard = self.port.lock().await;
            let io = guard.as_mut().ok_or(TransportError::Closed)?;
            io.discard_buffers()?;
            io.write_all(frame.as_bytes())
                .await
                .map_err(|e| TransportError::SendFailed(e.to_string()))?;
            io.flush().await?;
        }
        debug!("[{}] TX {}", self.key, escape_ascii_frame(frame.as_bytes()));

        let port = Arc::clone(&self.port);
        let delay = self.supervisor.response_timeout().min(MAX_REPLY_DELAY);
        let key = self.key.clone();
        self.supervisor.watch(trigger, async move {
            tokio::time::sleep(delay).await;
            let mut guard = port.lock().await;
            let Some(io) = guard.as_mut() else {
                return PlcAck::Unconfirmed;
            };
            let reply = read_available(io.as_mut()).await;
            if !reply.is_empty() {
                debug!("[{}] RX {}", key, escape_ascii_frame(&reply));
            }
            hostlink::interpret_reply(&reply).map_or(PlcAck::Unconfirmed, PlcAck::from)
        });

        Ok(())
    }

    pub async fn close(&self) {
        self.supervisor.shutdown().await;
        if self.port.lock().await.take().is_some() {
            debug!("[{}] serial port released", self.key);
        }
    }

    pub fn supervisor(&self) -> &ConfirmationSupervisor {
        &self.supervisor
    }
}

impl std::fmt::Debug for SerialChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialChannel").field("key", &self.key).finish()
    }
}
