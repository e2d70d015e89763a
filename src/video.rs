//! Video hand-off
//!
//! The drone streams raw video to a local UDP port once `streamon`
//! succeeds. Decoding is left to an external consumer; this module only
//! brackets the stream with the enable and disable commands.

use crate::error::Result;
use crate::session::Session;
use std::net::SocketAddr;
use tello_shared::commands;
use tracing::{info, warn};

/// An enabled video stream, waiting for its consumer to finish
#[must_use = "call finish() to send streamoff"]
pub struct VideoHandoff<'a> {
    session: &'a Session,
    endpoint: SocketAddr,
    finished: bool,
}

impl<'a> VideoHandoff<'a> {
    pub(crate) fn new(session: &'a Session, endpoint: SocketAddr) -> Self {
        Self {
            session,
            endpoint,
            finished: false,
        }
    }

    /// Local endpoint the drone streams to
    pub fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    /// Endpoint in the `udp://@host:port` form media decoders accept
    pub fn url(&self) -> String {
        format!("udp://@{}", self.endpoint)
    }

    /// Disable the stream once the consumer has stopped pulling frames
    pub async fn finish(mut self) -> Result<()> {
        self.finished = true;
        self.session.execute(&commands::streamoff()).await?;
        info!("Video stream on {} disabled", self.endpoint);
        Ok(())
    }
}

impl Drop for VideoHandoff<'_> {
    fn drop(&mut self) {
        if !self.finished {
            warn!(
                "Video hand-off for {} dropped without finish; stream left enabled",
                self.endpoint
            );
        }
    }
}

