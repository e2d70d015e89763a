//! Session Module
//!
//! Owns a connected drone: the command and telemetry channels, the
//! keepalive task, and teardown of all of it.

pub mod keepalive;
mod manager;

pub use keepalive::{KeepaliveConfig, KeepaliveHandle};
pub use manager::{Session, SessionConfig};
