//! Keepalive
//!
//! The drone drops out of SDK mode (and lands) after a period without
//! commands. While a session is active, a background task sends a cheap
//! query at a fixed interval. Its results are ignored and its failures never
//! reach the caller.

use crate::command::ExchangeCorrelator;
use crate::error::LinkError;
use crate::transport::DatagramChannel;
use bytes::Bytes;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Keepalive parameters
#[derive(Debug, Clone)]
pub struct KeepaliveConfig {
    /// Time between queries
    pub interval: Duration,
    /// Response timeout for each query
    pub timeout: Duration,
    /// Encoded query line
    pub query: Bytes,
}

/// Start the keepalive loop over `correlator`
///
/// The first query goes out one interval after start. A tick that finds
/// another exchange in flight is skipped: that exchange already counts as
/// activity.
pub fn spawn<C: DatagramChannel>(
    correlator: Arc<ExchangeCorrelator<C>>,
    config: KeepaliveConfig,
    cancel: CancellationToken,
) -> KeepaliveHandle {
    let token = cancel.clone();

    let task = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + config.interval, config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let query = correlator.try_issue(&config.query, config.timeout);
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                result = query => result,
            };

            match result {
                Ok(response) => debug!("[KEEPALIVE] Drone answered: {}", response),
                Err(LinkError::ConcurrentExchange(_)) => {
                    debug!("[KEEPALIVE] Channel busy, skipping tick")
                }
                Err(LinkError::ChannelClosed(_)) => break,
                Err(e) => debug!("[KEEPALIVE] Query failed: {}", e),
            }
        }

        info!("[KEEPALIVE] Stopped");
    });

    KeepaliveHandle { task, cancel }
}

/// Handle to stop the keepalive task
pub struct KeepaliveHandle {
    task: JoinHandle<()>,
    cancel: CancellationToken,
}

impl KeepaliveHandle {
    /// Cancel the task and wait up to `grace` for it to finish
    ///
    /// Returns false if the task had to be aborted.
    pub async fn stop(mut self, grace: Duration) -> bool {
        self.cancel.cancel();

        match tokio::time::timeout(grace, &mut self.task).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!("[KEEPALIVE] Task ended abnormally: {}", e);
                true
            }
            Err(_) => {
                warn!("[KEEPALIVE] Task ignored cancellation for {:?}, aborting", grace);
                self.task.abort();
                false
            }
        }
    }

    /// Whether the task has finished
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for KeepaliveHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
