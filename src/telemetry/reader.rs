//! Telemetry Reader
//!
//! Decodes every datagram pushed on the telemetry channel and keeps the
//! freshest record. Last write wins; nothing is queued.

use crate::error::{LinkError, Result};
use crate::transport::DatagramChannel;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tello_shared::telemetry;
use tello_shared::TelemetryRecord;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Pause after a receive error before listening again
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Holds the latest decoded telemetry record
pub struct TelemetryReader {
    /// Latest record, `None` until the first valid line arrives
    latest: watch::Sender<Option<TelemetryRecord>>,
    /// Count of lines that decoded into a record
    decoded: AtomicU64,
    /// Count of malformed lines that were discarded
    rejected: AtomicU64,
}

impl TelemetryReader {
    /// Create a new telemetry reader
    pub fn new() -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            latest,
            decoded: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Decode one datagram and, if it holds a record, make it the latest
    ///
    /// A malformed line leaves the previous record in place.
    pub fn process_datagram(&self, datagram: &[u8]) -> Result<()> {
        match telemetry::decode_datagram(datagram) {
            Ok(Some(record)) => {
                self.decoded.fetch_add(1, Ordering::Relaxed);
                self.latest.send_replace(Some(record));
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                Err(e.into())
            }
        }
    }

    /// Latest record, without waiting
    pub fn latest(&self) -> Option<TelemetryRecord> {
        self.latest.borrow().clone()
    }

    /// Wait up to `timeout` for a record newer than the current one
    pub async fn next(&self, timeout: Duration) -> Result<TelemetryRecord> {
        let mut rx = self.latest.subscribe();

        let wait = async {
            loop {
                if rx.changed().await.is_err() {
                    return Err(LinkError::ChannelClosed("telemetry"));
                }
                if let Some(record) = rx.borrow_and_update().clone() {
                    return Ok(record);
                }
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(LinkError::Timeout(timeout)),
        }
    }

    /// Number of records decoded so far
    pub fn decoded_count(&self) -> u64 {
        self.decoded.load(Ordering::Relaxed)
    }

    /// Number of malformed lines discarded so far
    pub fn rejected_count(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Start the receive loop on `channel`
    ///
    /// The loop ends when `cancel` fires or the channel is closed.
    pub fn spawn<C: DatagramChannel>(
        self: &Arc<Self>,
        channel: Arc<C>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let reader = self.clone();

        tokio::spawn(async move {
            loop {
                let datagram = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    result = channel.next_datagram() => result,
                };

                match datagram {
                    Ok(datagram) => {
                        if let Err(e) = reader.process_datagram(&datagram) {
                            warn!("[TELEMETRY] Discarding malformed line: {}", e);
                        }
                    }
                    Err(LinkError::ChannelClosed(_)) => break,
                    Err(e) => {
                        // ICMP errors surface here on some platforms; keep listening
                        debug!("[TELEMETRY] Receive error: {}", e);
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(RECEIVE_ERROR_BACKOFF) => {}
                        }
                    }
                }
            }

            info!(
                "[TELEMETRY] Reader stopped ({} decoded, {} rejected)",
                reader.decoded_count(),
                reader.rejected_count()
            );
        })
    }
}

impl Default for TelemetryReader {
    fn default() -> Self {
        Self::new()
    }
}
