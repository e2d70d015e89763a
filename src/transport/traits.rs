//! Datagram channel abstraction

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;

/// One bound datagram endpoint with send/receive as its only primitives
#[async_trait]
pub trait DatagramChannel: Send + Sync + 'static {
    /// Fire-and-forget send to the channel's peer
    async fn send(&self, datagram: &[u8]) -> Result<()>;

    /// Suspend until the next datagram arrives, in arrival order
    ///
    /// Fails with `ChannelClosed` once [`close`](Self::close) has been called,
    /// including for callers already suspended here.
    async fn next_datagram(&self) -> Result<Bytes>;

    /// Release the channel and wake every suspended receiver
    fn close(&self);

    /// Whether [`close`](Self::close) has been called
    fn is_closed(&self) -> bool;

    /// Human-readable name for this channel
    fn name(&self) -> &'static str;
}
