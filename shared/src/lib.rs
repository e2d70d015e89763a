//! Tello Shared Protocol Types
//!
//! This crate provides the I/O-free half of the Tello link: the line codec,
//! the telemetry decoder, the command catalog and the session lifecycle
//! state machine.

pub mod codec;
pub mod commands;
pub mod state_machine;
pub mod telemetry;

// Re-export commonly used types at crate root
pub use codec::{Arg, Response};
pub use commands::{CatalogError, Command, FormatError, Reply, ReplyFormat};
pub use state_machine::{LifecycleEvent, LifecycleStateMachine, SessionState};
pub use telemetry::{ParseError, TelemetryRecord};

/// Well-known device addresses and ports
pub mod net {
    /// Address of the drone on its own access point
    pub const DEFAULT_DEVICE_IP: &str = "192.168.10.1";

    /// UDP port the drone listens on for commands (and answers from)
    pub const COMMAND_PORT: u16 = 8889;

    /// UDP port the drone pushes telemetry to
    pub const TELEMETRY_PORT: u16 = 8890;

    /// UDP port the drone streams video to after `streamon`
    pub const VIDEO_PORT: u16 = 11111;

    /// Largest datagram we expect from the drone
    pub const MAX_DATAGRAM_SIZE: usize = 2048;
}

/// Timing parameters for the link
pub mod timing {
    /// Default per-call response timeout in milliseconds
    pub const COMMAND_TIMEOUT_MS: u64 = 10_000;

    /// Mode-entry handshake timeout in milliseconds
    pub const CONNECT_TIMEOUT_MS: u64 = 10_000;

    /// Interval between keepalive queries; the drone lands itself after
    /// 15 seconds without a command
    pub const KEEPALIVE_INTERVAL_MS: u64 = 10_000;

    /// How long teardown waits for the keepalive task to acknowledge
    pub const KEEPALIVE_STOP_GRACE_MS: u64 = 1_000;
}
