//! In-memory datagram channel for exercising exchanges without sockets

use crate::error::{LinkError, Result};
use crate::transport::traits::DatagramChannel;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// A channel whose "device" side is driven by the test
pub struct MemoryChannel {
    inbound_tx: mpsc::UnboundedSender<Bytes>,
    inbound_rx: Mutex<mpsc::UnboundedReceiver<Bytes>>,
    outbound_tx: mpsc::UnboundedSender<Bytes>,
    closed: CancellationToken,
}

/// The device end of a [`MemoryChannel`]
pub struct MemoryDevice {
    /// Requests sent by the client, in order
    pub requests: mpsc::UnboundedReceiver<Bytes>,
    replies: mpsc::UnboundedSender<Bytes>,
}

impl MemoryDevice {
    /// Push a datagram to the client
    pub fn reply(&self, datagram: &[u8]) {
        let _ = self.replies.send(Bytes::copy_from_slice(datagram));
    }
}

impl MemoryChannel {
    pub fn pair() -> (Self, MemoryDevice) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, requests) = mpsc::unbounded_channel();

        let channel = Self {
            inbound_tx: inbound_tx.clone(),
            inbound_rx: Mutex::new(inbound_rx),
            outbound_tx,
            closed: CancellationToken::new(),
        };
        let device = MemoryDevice {
            requests,
            replies: inbound_tx,
        };
        (channel, device)
    }

    /// Inject a datagram as if the device had sent it
    pub fn inject(&self, datagram: &[u8]) {
        let _ = self.inbound_tx.send(Bytes::copy_from_slice(datagram));
    }
}

#[async_trait]
impl DatagramChannel for MemoryChannel {
    async fn send(&self, datagram: &[u8]) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(LinkError::ChannelClosed("memory"));
        }
        let _ = self.outbound_tx.send(Bytes::copy_from_slice(datagram));
        Ok(())
    }

    async fn next_datagram(&self) -> Result<Bytes> {
        let mut inbound = tokio::select! {
            biased;
            _ = self.closed.cancelled() => return Err(LinkError::ChannelClosed("memory")),
            guard = self.inbound_rx.lock() => guard,
        };

        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(LinkError::ChannelClosed("memory")),
            datagram = inbound.recv() => datagram.ok_or(LinkError::ChannelClosed("memory")),
        }
    }

    fn close(&self) {
        self.closed.cancel();
    }

    fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
