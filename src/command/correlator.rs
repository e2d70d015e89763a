//! Exchange correlator - pairs one request with the next datagram
//!
//! UDP carries no sequence numbers, so the only correlation available is
//! "the next datagram on this channel answers the outstanding request". That
//! holds only while at most one exchange is in flight, which this type
//! enforces: every exchange runs under an exclusive slot, and the slot's
//! Idle/Awaiting state is reset when the exchange ends by any path
//! (response, timeout, error or the caller dropping the future).
//!
//! A response that arrives after its exchange timed out is left on the
//! channel and answers the next exchange instead.

use crate::error::{LinkError, Result};
use crate::transport::DatagramChannel;
use std::sync::Arc;
use std::time::Duration;
use tello_shared::codec::{self, Response};
use tokio::sync::{watch, Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Exchange state of one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    /// No exchange pending
    Idle,
    /// One exchange waiting for its response
    Awaiting { deadline: Instant },
}

/// The single in-flight exchange; dropping it returns the channel to Idle
struct PendingExchange<'a> {
    _slot: MutexGuard<'a, ()>,
    state: &'a watch::Sender<ExchangeState>,
    deadline: Instant,
}

impl<'a> PendingExchange<'a> {
    fn begin(
        slot: MutexGuard<'a, ()>,
        state: &'a watch::Sender<ExchangeState>,
        timeout: Duration,
    ) -> Self {
        let deadline = Instant::now() + timeout;
        state.send_replace(ExchangeState::Awaiting { deadline });
        Self {
            _slot: slot,
            state,
            deadline,
        }
    }
}

impl Drop for PendingExchange<'_> {
    fn drop(&mut self) {
        self.state.send_replace(ExchangeState::Idle);
    }
}

/// Request/response multiplexer over one datagram channel
pub struct ExchangeCorrelator<C: DatagramChannel> {
    channel: Arc<C>,
    slot: Mutex<()>,
    state: watch::Sender<ExchangeState>,
}

impl<C: DatagramChannel> ExchangeCorrelator<C> {
    /// Create a correlator that owns exchanges on `channel`
    pub fn new(channel: Arc<C>) -> Self {
        let (state, _) = watch::channel(ExchangeState::Idle);
        Self {
            channel,
            slot: Mutex::new(()),
            state,
        }
    }

    /// The underlying channel
    pub fn channel(&self) -> &Arc<C> {
        &self.channel
    }

    /// Current exchange state
    pub fn state(&self) -> ExchangeState {
        *self.state.borrow()
    }

    /// Subscribe to exchange state changes
    pub fn subscribe(&self) -> watch::Receiver<ExchangeState> {
        self.state.subscribe()
    }

    /// Send `request` and wait up to `timeout` for the next datagram
    ///
    /// Callers are serialized: while another exchange is awaiting, this waits
    /// for the channel to return to Idle before sending. The wait for the
    /// slot does not count against `timeout`.
    pub async fn issue(&self, request: &[u8], timeout: Duration) -> Result<Response> {
        let slot = self.slot.lock().await;
        self.exchange(slot, request, timeout).await
    }

    /// Like [`issue`](Self::issue), but fails fast with `ConcurrentExchange`
    /// instead of waiting when an exchange is already in flight
    pub async fn try_issue(&self, request: &[u8], timeout: Duration) -> Result<Response> {
        let slot = self
            .slot
            .try_lock()
            .map_err(|_| LinkError::ConcurrentExchange(self.channel.name()))?;
        self.exchange(slot, request, timeout).await
    }

    async fn exchange(
        &self,
        slot: MutexGuard<'_, ()>,
        request: &[u8],
        timeout: Duration,
    ) -> Result<Response> {
        let pending = PendingExchange::begin(slot, &self.state, timeout);
        let line = String::from_utf8_lossy(request);

        self.channel.send(request).await?;
        debug!(channel = self.channel.name(), request = %line, "request sent");

        match tokio::time::timeout_at(pending.deadline, self.channel.next_datagram()).await {
            Ok(Ok(datagram)) => {
                let response = codec::decode(&datagram);
                debug!(
                    channel = self.channel.name(),
                    request = %line,
                    response = %response,
                    "exchange complete"
                );
                Ok(response)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!(
                    channel = self.channel.name(),
                    request = %line,
                    timeout_ms = timeout.as_millis() as u64,
                    "exchange timed out"
                );
                Err(LinkError::Timeout(timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::{MemoryChannel, MemoryDevice};
    use bytes::Bytes;
    use tokio::sync::mpsc::error::TryRecvError;

    fn correlator() -> (Arc<ExchangeCorrelator<MemoryChannel>>, MemoryDevice) {
        let (channel, device) = MemoryChannel::pair();
        (Arc::new(ExchangeCorrelator::new(Arc::new(channel))), device)
    }

    const LONG: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_issue_returns_decoded_response() {
        let (correlator, mut device) = correlator();

        let responder = tokio::spawn(async move {
            let request = device.requests.recv().await.unwrap();
            assert_eq!(request, Bytes::from_static(b"battery?"));
            device.reply(b"87\r\n");
            device
        });

        let response = correlator.issue(b"battery?", LONG).await.unwrap();
        assert_eq!(response, Response::Success("87".into()));
        assert_eq!(correlator.state(), ExchangeState::Idle);
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_error_responses_are_data() {
        let (correlator, device) = correlator();

        device.reply(b"unknown command: flyy");
        let response = correlator.issue(b"flyy", LONG).await.unwrap();
        assert_eq!(response, Response::UnknownCommand("flyy".into()));

        device.reply(b"error Not Joystick");
        let response = correlator.issue(b"rc 0 0 0 0", LONG).await.unwrap();
        assert!(matches!(response, Response::DeviceError(_)));
    }

    #[tokio::test]
    async fn test_timeout_does_not_poison_channel() {
        let (correlator, device) = correlator();

        let result = correlator.issue(b"takeoff", Duration::from_millis(30)).await;
        assert!(matches!(result, Err(LinkError::Timeout(_))));
        assert_eq!(correlator.state(), ExchangeState::Idle);

        device.reply(b"ok");
        let response = correlator.issue(b"land", LONG).await.unwrap();
        assert_eq!(response, Response::Success("ok".into()));
    }

    #[tokio::test]
    async fn test_late_response_answers_next_exchange() {
        let (correlator, device) = correlator();

        let result = correlator.issue(b"sdk?", Duration::from_millis(20)).await;
        assert!(matches!(result, Err(LinkError::Timeout(_))));

        // The late answer to "sdk?" is not dropped
        device.reply(b"30");
        let response = correlator.issue(b"battery?", LONG).await.unwrap();
        assert_eq!(response, Response::Success("30".into()));
    }

    #[tokio::test]
    async fn test_concurrent_issue_is_serialized() {
        let (correlator, mut device) = correlator();

        let responder = tokio::spawn(async move {
            for _ in 0..2 {
                let request = device.requests.recv().await.unwrap();
                // While one exchange is awaiting, nobody else may send
                tokio::time::sleep(Duration::from_millis(40)).await;
                assert!(matches!(device.requests.try_recv(), Err(TryRecvError::Empty)));
                device.reply(&request);
            }
        });

        let a = {
            let correlator = correlator.clone();
            tokio::spawn(async move { correlator.issue(b"speed?", LONG).await })
        };
        let b = {
            let correlator = correlator.clone();
            tokio::spawn(async move { correlator.issue(b"time?", LONG).await })
        };

        // Each caller receives the echo of its own request
        assert_eq!(a.await.unwrap().unwrap(), Response::Success("speed?".into()));
        assert_eq!(b.await.unwrap().unwrap(), Response::Success("time?".into()));
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_try_issue_fails_fast_while_awaiting() {
        let (correlator, mut device) = correlator();
        let mut state = correlator.subscribe();

        let in_flight = {
            let correlator = correlator.clone();
            tokio::spawn(async move { correlator.issue(b"takeoff", LONG).await })
        };

        state
            .wait_for(|s| matches!(s, ExchangeState::Awaiting { .. }))
            .await
            .unwrap();

        let result = correlator.try_issue(b"time?", LONG).await;
        assert!(matches!(result, Err(LinkError::ConcurrentExchange(_))));

        // The in-flight exchange is untouched
        assert_eq!(device.requests.recv().await.unwrap(), Bytes::from_static(b"takeoff"));
        device.reply(b"ok");
        assert_eq!(in_flight.await.unwrap().unwrap(), Response::Success("ok".into()));
        assert!(matches!(device.requests.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_dropped_caller_returns_channel_to_idle() {
        let (correlator, device) = correlator();

        let abandoned =
            tokio::time::timeout(Duration::from_millis(20), correlator.issue(b"land", LONG)).await;
        assert!(abandoned.is_err());
        assert_eq!(correlator.state(), ExchangeState::Idle);

        device.reply(b"ok");
        assert!(correlator.try_issue(b"land", LONG).await.is_ok());
    }

    #[tokio::test]
    async fn test_closed_channel_unblocks_exchange() {
        let (correlator, _device) = correlator();

        let in_flight = {
            let correlator = correlator.clone();
            tokio::spawn(async move { correlator.issue(b"takeoff", LONG).await })
        };

        let mut state = correlator.subscribe();
        state
            .wait_for(|s| matches!(s, ExchangeState::Awaiting { .. }))
            .await
            .unwrap();
        correlator.channel().close();

        let result = in_flight.await.unwrap();
        assert!(matches!(result, Err(LinkError::ChannelClosed(_))));
        assert_eq!(correlator.state(), ExchangeState::Idle);
    }
}
