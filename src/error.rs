//! Error taxonomy for the drone link

use std::time::Duration;
use tello_shared::{FormatError, ParseError, SessionState};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LinkError>;

/// Errors surfaced by channels, exchanges and sessions
#[derive(Error, Debug)]
pub enum LinkError {
    /// No response within the per-call deadline; the caller may retry
    #[error("No response within {0:?}")]
    Timeout(Duration),

    /// The device rejected the command name
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// The device reported a generic failure
    #[error("Drone reported an error: {0}")]
    DeviceError(String),

    /// Malformed telemetry
    #[error("Telemetry parse error: {0}")]
    Parse(#[from] ParseError),

    /// The mode-entry command did not succeed
    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    /// Another exchange is already awaiting a response on this channel
    #[error("An exchange is already in flight on the {0} channel")]
    ConcurrentExchange(&'static str),

    /// The channel was closed while (or before) waiting on it
    #[error("The {0} channel is closed")]
    ChannelClosed(&'static str),

    /// Send attempted on a channel without a fixed peer
    #[error("The {0} channel has no peer to send to")]
    NoPeer(&'static str),

    /// Command issued outside the Active state
    #[error("Session is {0}, not active")]
    NotActive(SessionState),

    #[error("Unexpected reply: {0}")]
    Format(#[from] FormatError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
