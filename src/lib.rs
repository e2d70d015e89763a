//! Tello link
//!
//! Request/response over the drone's UDP command channel, telemetry
//! decoding, keepalive and session teardown.

pub mod command;
pub mod error;
pub mod link;
pub mod session;
pub mod telemetry;
pub mod transport;
pub mod video;

pub use command::{CommandExecutor, ExchangeCorrelator, ExchangeState};
pub use error::{LinkError, Result};
pub use link::DroneLink;
pub use session::{Session, SessionConfig};
pub use telemetry::TelemetryReader;
pub use video::VideoHandoff;

pub use tello_shared as shared;
