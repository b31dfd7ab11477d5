//! PLC transport layer
//!
//! Each write channel owns one link to the PLC and knows how to frame a single
//! bit write for it. After a write the channel spawns a bounded wait for the
//! PLC reply; the wait is tracked by the channel so closing it cancels the wait
//! instead of leaving it running against a dropped handle.
//!
//! ```text
//! TransportChannel ─┬─ SerialChannel  HostLink ASCII
//!                   ├─ UdpChannel     binary FINS
//!                   └─ TcpChannel     FINS/TCP, handshake gated
//!         │
//!         └─ ConfirmationSupervisor ── PlcResponseObserver
//! ```

pub mod channel;
pub mod observer;
pub mod serial;
pub mod tcp;
pub mod udp;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use errors::StationError;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn, Level};

use crate::core::config::Trigger;
use crate::core::protocols::fins::frame::HandshakeError;
use crate::core::protocols::fins::ReplyStatus;

pub use channel::TransportChannel;
pub use observer::{LoggingObserver, PlcResponseObserver, RecordingObserver};

/// Upper bound on waiting for confirmation tasks during close
pub const CLOSE_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Transport layer error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Channel closed")]
    Closed,

    #[error("IO error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

impl From<TransportError> for StationError {
    fn from(err: TransportError) -> Self {
        StationError::Transport(err.to_string())
    }
}

/// What became of one bit write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlcAck {
    /// Zero end code
    Confirmed,
    /// Non-zero end code or an abnormal serial reply
    Rejected(String),
    /// Nothing came back in time; counts as success
    Unconfirmed,
    /// Reply too short to carry an end code
    Malformed(String),
    /// The command never left the station
    SendFailed(String),
}

impl PlcAck {
    /// Whether the station treats the write as done
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Unconfirmed)
    }
}

impl From<ReplyStatus> for PlcAck {
    fn from(status: ReplyStatus) -> Self {
        match status {
            ReplyStatus::Normal => Self::Confirmed,
            ReplyStatus::Abnormal(detail) => Self::Rejected(detail),
            malformed @ ReplyStatus::Truncated { .. } => Self::Malformed(malformed.to_string()),
        }
    }
}

impl std::fmt::Display for PlcAck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Confirmed => write!(f, "confirmed"),
            Self::Rejected(code) => write!(f, "rejected ({code})"),
            Self::Unconfirmed => write!(f, "sent, unconfirmed"),
            Self::Malformed(detail) => write!(f, "malformed reply ({detail})"),
            Self::SendFailed(reason) => write!(f, "send failed ({reason})"),
        }
    }
}

// ============================================================================
// Confirmation supervision
// ============================================================================

/// Tracks the confirmation waits spawned by one channel
#[derive(Clone)]
pub struct ConfirmationSupervisor {
    channel: String,
    response_timeout: Duration,
    observer: Arc<dyn PlcResponseObserver>,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl ConfirmationSupervisor {
    pub fn new(
        channel: impl Into<String>,
        response_timeout: Duration,
        observer: Arc<dyn PlcResponseObserver>,
    ) -> Self {
        Self {
            channel: channel.into(),
            response_timeout,
            observer,
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn response_timeout(&self) -> Duration {
        self.response_timeout
    }

    pub fn observer(&self) -> &Arc<dyn PlcResponseObserver> {
        &self.observer
    }

    /// Number of waits still running
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Spawn a detached wait and report its outcome to the observer
    pub fn watch<F>(&self, trigger: Trigger, wait: F)
    where
        F: Future<Output = PlcAck> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        let observer = Arc::clone(&self.observer);
        let channel = self.channel.clone();
        let timeout_ms = self.response_timeout.as_millis() as u64;

        self.tracker.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("[{}] confirmation wait for {} abandoned on close", channel, trigger);
                },
                ack = wait => {
                    if ack == PlcAck::Unconfirmed {
                        log_unconfirmed(StationError::ConfirmationTimeout {
                            channel: channel.clone(),
                            timeout_ms,
                        });
                    }
                    observer.on_response(trigger, &channel, &ack);
                },
            }
        });
    }

    /// Report an outcome known without waiting
    pub fn report(&self, trigger: Trigger, ack: PlcAck) {
        self.observer.on_response(trigger, &self.channel, &ack);
    }

    /// Cancel outstanding waits and wait for them to finish
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        if tokio::time::timeout(CLOSE_DRAIN_TIMEOUT, self.tracker.wait())
            .await
            .is_err()
        {
            debug!(
                "[{}] {} confirmation waits still running after close",
                self.channel,
                self.tracker.len()
            );
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// The command went out; a silent PLC is a soft success
fn log_unconfirmed(timeout: StationError) {
    match timeout.log_level() {
        Level::INFO => info!("{} [{}], treated as sent", timeout, timeout.error_code()),
        _ => warn!("{} [{}]", timeout, timeout.error_code()),
    }
}

impl std::fmt::Debug for ConfirmationSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfirmationSupervisor")
            .field("channel", &self.channel)
            .field("response_timeout", &self.response_timeout)
            .field("in_flight", &self.tracker.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_ack_success_classification() {
        assert!(PlcAck::Confirmed.is_success());
        assert!(PlcAck::Unconfirmed.is_success());
        assert!(!PlcAck::Rejected("0401".into()).is_success());
        assert!(!PlcAck::SendFailed("closed".into()).is_success());
    }

    #[test]
    fn test_ack_from_reply_status() {
        assert_eq!(PlcAck::from(ReplyStatus::Normal), PlcAck::Confirmed);
        assert!(matches!(
            PlcAck::from(ReplyStatus::Truncated {
                len: 3,
                expected: 14
            }),
            PlcAck::Malformed(_)
        ));
    }

    #[tokio::test]
    async fn test_supervisor_reports_outcome() {
        let observer = Arc::new(RecordingObserver::default());
        let supervisor =
            ConfirmationSupervisor::new("UDP_0", Duration::from_millis(100), observer.clone());

        supervisor.watch(Trigger::LeftReadSuccess, async { PlcAck::Confirmed });
        supervisor.shutdown().await;

        assert_eq!(
            observer.acks(),
            vec![(
                Trigger::LeftReadSuccess,
                "UDP_0".to_string(),
                PlcAck::Confirmed
            )]
        );
    }

    #[tokio::test]
    #[traced_test]
    async fn test_silent_plc_logs_confirmation_timeout() {
        let observer = Arc::new(RecordingObserver::default());
        let supervisor =
            ConfirmationSupervisor::new("UDP_3", Duration::from_millis(250), observer.clone());

        supervisor.watch(Trigger::LeftReadFailure, async { PlcAck::Unconfirmed });
        supervisor.shutdown().await;

        assert_eq!(observer.acks_for("UDP_3"), vec![PlcAck::Unconfirmed]);
        assert!(logs_contain("No confirmation from UDP_3 within 250ms"));
        assert!(logs_contain("CONFIRMATION_TIMEOUT"));
    }

    #[tokio::test]
    async fn test_shutdown_cancels_pending_waits() {
        let observer = Arc::new(RecordingObserver::default());
        let supervisor =
            ConfirmationSupervisor::new("TCP_1", Duration::from_secs(60), observer.clone());

        supervisor.watch(Trigger::RightReadFailure, async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            PlcAck::Unconfirmed
        });
        assert_eq!(supervisor.in_flight(), 1);

        supervisor.shutdown().await;
        assert_eq!(supervisor.in_flight(), 0);
        assert!(supervisor.is_shut_down());
        assert!(observer.acks().is_empty());
    }
}
