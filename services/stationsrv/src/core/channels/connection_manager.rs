//! Write channel registry
//!
//! Channels are opened at startup and closed at shutdown; in between the set
//! is only read for fan-out. Closing first marks the set closed so no new send
//! picks up a channel that is being torn down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::core::config::TransportConfig;
use crate::core::transport::{PlcResponseObserver, TransportChannel};

pub struct ConnectionManager {
    channels: DashMap<String, Arc<TransportChannel>>,
    closed: AtomicBool,
    response_timeout: Duration,
    observer: Arc<dyn PlcResponseObserver>,
}

impl ConnectionManager {
    pub fn new(response_timeout: Duration, observer: Arc<dyn PlcResponseObserver>) -> Self {
        Self {
            channels: DashMap::new(),
            closed: AtomicBool::new(false),
            response_timeout,
            observer,
        }
    }

    /// Open every write link, best effort
    ///
    /// Every link is attempted even when an earlier one fails. Returns true
    /// only if all of them opened.
    pub async fn open_all(&self, configs: &[TransportConfig]) -> bool {
        self.closed.store(false, Ordering::SeqCst);

        let writable: Vec<&TransportConfig> = configs.iter().filter(|c| c.is_write()).collect();
        if writable.is_empty() {
            warn!("No write channel configured, PLC signals will only be logged");
            return true;
        }

        info!("Opening {} write channels...", writable.len());

        let open_futures = writable.into_iter().map(|config| {
            let observer = Arc::clone(&self.observer);
            let response_timeout = self.response_timeout;
            async move {
                let key = config.key();
                match TransportChannel::open(config, response_timeout, observer).await {
                    Ok(channel) => Ok(channel),
                    Err(e) => Err((key, e)),
                }
            }
        });

        let mut opened = 0;
        let mut failed = 0;
        for result in join_all(open_futures).await {
            match result {
                Ok(channel) => {
                    debug!("[{}] {} channel open", channel.key(), channel.kind());
                    self.register(channel);
                    opened += 1;
                },
                Err((key, e)) => {
                    warn!("[{}] channel unavailable, excluded from fan-out: {}", key, e);
                    failed += 1;
                },
            }
        }

        info!(
            "Channel initialization completed: {} open, {} failed",
            opened, failed
        );
        failed == 0
    }

    /// Add an already open channel, replacing one with the same key
    pub fn register(&self, channel: TransportChannel) {
        let key = channel.key().to_string();
        if let Some(previous) = self.channels.insert(key.clone(), Arc::new(channel)) {
            warn!("[{}] replaced an open channel with the same key", key);
            tokio::spawn(async move { previous.close().await });
        }
    }

    /// Open channels available for a send, ordered by key
    pub fn write_channels(&self) -> Vec<Arc<TransportChannel>> {
        if self.is_closed() {
            return Vec::new();
        }
        let mut channels: Vec<Arc<TransportChannel>> = self
            .channels
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        channels.sort_by(|a, b| a.key().cmp(b.key()));
        channels
    }

    pub fn channel_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.channels.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Close every channel; safe to call any number of times
    pub async fn close_all(&self) {
        let already_closed = self.closed.swap(true, Ordering::SeqCst);

        let keys: Vec<String> = self.channels.iter().map(|e| e.key().clone()).collect();
        let channels: Vec<Arc<TransportChannel>> = keys
            .iter()
            .filter_map(|key| self.channels.remove(key).map(|(_, channel)| channel))
            .collect();

        if channels.is_empty() {
            if !already_closed {
                debug!("No channels to close");
            }
            return;
        }

        info!("Closing {} channels...", channels.len());
        join_all(channels.iter().map(|channel| channel.close())).await;
        info!("All channels closed");
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("channels", &self.channel_keys())
            .field("closed", &self.is_closed())
            .finish()
    }
}
