//! SN ingestion from the scanner ports
//!
//! Each read-role serial port gets one reader task. A scan arrives as a burst
//! of bytes; the reader waits for the burst to settle, trims it and forwards
//! `(side, sn)` to the runtime.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::core::config::{SerialPortConfig, Side};
use crate::core::transport::serial::{open_stream, read_available};

/// Wait after the first byte before the scan is read as a whole
pub const SETTLE_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEvent {
    pub side: Side,
    pub sn: String,
}

/// Drop a trailing `+suffix` the scanners append to some labels
///
/// `FM71234+56AT+ANB` becomes `FM71234+56AT`. A `+` in first position is
/// part of the SN and is kept.
pub fn strip_sn_suffix(sn: &str) -> &str {
    match sn.rfind('+') {
        Some(idx) if idx > 0 => &sn[..idx],
        _ => sn,
    }
}

/// Turn a raw scanner burst into an SN, `None` when nothing is left
pub fn normalize_scan(raw: &[u8], remove_suffix: bool) -> Option<String> {
    let text = String::from_utf8_lossy(raw);
    let mut sn = text.trim();
    if remove_suffix {
        sn = strip_sn_suffix(sn);
    }
    (!sn.is_empty()).then(|| sn.to_string())
}

/// Reader tasks of every scanner port
#[derive(Debug)]
pub struct SnIngestion {
    tracker: TaskTracker,
    cancel: CancellationToken,
    remove_suffix: bool,
    tx: mpsc::Sender<ScanEvent>,
}

impl SnIngestion {
    pub fn new(remove_suffix: bool, tx: mpsc::Sender<ScanEvent>) -> Self {
        Self {
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
            remove_suffix,
            tx,
        }
    }

    /// Open every read-role port; a port that fails to open is skipped
    pub fn open_ports(&self, ports: &[SerialPortConfig]) -> usize {
        let mut opened = 0;
        for port in ports {
            let Some(side) = port.role.read_side() else {
                continue;
            };
            let key = format!("Serial_{}", port.index);
            match open_stream(port) {
                Ok(stream) => {
                    info!("[{}] scanner for side {} on {}", key, side, port.port_name);
                    self.spawn_reader(key, side, stream);
                    opened += 1;
                },
                Err(e) => warn!("[{}] scanner unavailable: {}", key, e),
            }
        }
        opened
    }

    pub fn spawn_reader<R>(&self, key: String, side: Side, io: R)
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let cancel = self.cancel.clone();
        let tx = self.tx.clone();
        let remove_suffix = self.remove_suffix;
        self.tracker.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => debug!("[{}] reader stopped", key),
                _ = read_scans(&key, side, io, remove_suffix, tx) => {},
            }
        });
    }

    pub fn reader_count(&self) -> usize {
        self.tracker.len()
    }

    /// Stop every reader and wait for them to release their ports
    pub async fn stop(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}

async fn read_scans<R>(
    key: &str,
    side: Side,
    mut io: R,
    remove_suffix: bool,
    tx: mpsc::Sender<ScanEvent>,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 256];
    loop {
        let n = match io.read(&mut buf).await {
            Ok(0) => {
                info!("[{}] scanner port closed", key);
                return;
            },
            Ok(n) => n,
            Err(e) => {
                warn!("[{}] scanner read failed: {}", key, e);
                return;
            },
        };

        let mut raw = buf[..n].to_vec();
        tokio::time::sleep(SETTLE_DELAY).await;
        raw.extend(read_available(&mut io).await);

        let Some(sn) = normalize_scan(&raw, remove_suffix) else {
            debug!("[{}] blank scan ignored", key);
            continue;
        };
        info!("[{}] SN received on side {}: {}", key, side, sn);
        if tx.send(ScanEvent { side, sn }).await.is_err() {
            return;
        }
    }
}
