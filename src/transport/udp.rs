//! UDP channel implementation for the command and telemetry links

use crate::error::{LinkError, Result};
use crate::transport::traits::DatagramChannel;
use async_trait::async_trait;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use tello_shared::net::MAX_DATAGRAM_SIZE;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// A bound UDP socket, optionally fixed to one remote peer
///
/// Closing drops the socket, so the local port is free as soon as every
/// in-flight operation has observed the close.
pub struct UdpChannel {
    socket: Mutex<Option<Arc<UdpSocket>>>,
    peer: Option<SocketAddr>,
    closed: CancellationToken,
    name: &'static str,
}

impl UdpChannel {
    /// Bind `local` and, if `peer` is given, fix it as the only send target
    /// and the only accepted source
    pub async fn open(
        name: &'static str,
        local: SocketAddr,
        peer: Option<SocketAddr>,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(local).await?;
        if let Some(peer) = peer {
            socket.connect(peer).await?;
        }

        debug!(
            channel = name,
            local = %socket.local_addr()?,
            peer = ?peer,
            "UDP channel open"
        );

        Ok(Self {
            socket: Mutex::new(Some(Arc::new(socket))),
            peer,
            closed: CancellationToken::new(),
            name,
        })
    }

    /// Command channel: bound locally, fixed remote peer
    pub async fn command(local: SocketAddr, device: SocketAddr) -> Result<Self> {
        Self::open("command", local, Some(device)).await
    }

    /// Telemetry channel: bound locally, receive-only
    pub async fn telemetry(local: SocketAddr) -> Result<Self> {
        Self::open("telemetry", local, None).await
    }

    /// Address the socket is actually bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket()?.local_addr()?)
    }

    fn socket(&self) -> Result<Arc<UdpSocket>> {
        self.socket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(LinkError::ChannelClosed(self.name))
    }
}

#[async_trait]
impl DatagramChannel for UdpChannel {
    async fn send(&self, datagram: &[u8]) -> Result<()> {
        let socket = self.socket()?;
        if self.peer.is_none() {
            return Err(LinkError::NoPeer(self.name));
        }

        socket.send(datagram).await?;
        trace!(channel = self.name, bytes = datagram.len(), "sent datagram");
        Ok(())
    }

    async fn next_datagram(&self) -> Result<Bytes> {
        let socket = self.socket()?;
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        let received = tokio::select! {
            biased;
            _ = self.closed.cancelled() => return Err(LinkError::ChannelClosed(self.name)),
            result = socket.recv_from(&mut buf) => result,
        };

        let (n, from) = received?;
        trace!(channel = self.name, bytes = n, %from, "received datagram");
        Ok(Bytes::copy_from_slice(&buf[..n]))
    }

    fn close(&self) {
        let socket = self
            .socket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if socket.is_some() {
            debug!(channel = self.name, "closing UDP channel");
        }
        self.closed.cancel();
    }

    fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
