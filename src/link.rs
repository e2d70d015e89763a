//! The control interface a connected drone exposes to callers

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;
use tello_shared::{Response, TelemetryRecord};

/// Request/response plus latest-state access to one drone
#[async_trait]
pub trait DroneLink: Send + Sync {
    /// Send one encoded request and wait up to `timeout` for its response
    async fn issue(&self, request: &[u8], timeout: Duration) -> Result<Response>;

    /// Most recent decoded telemetry record, without waiting
    fn latest_telemetry(&self) -> Option<TelemetryRecord>;

    /// Timeout used when the caller does not pass one
    fn default_timeout(&self) -> Duration;
}
