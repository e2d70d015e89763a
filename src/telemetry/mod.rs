//! Telemetry Module
//!
//! Receives the drone's unsolicited state datagrams and exposes the most
//! recent decoded record.

mod reader;

pub use reader::TelemetryReader;
