//! Command executor - runs catalog commands over a drone link

use crate::error::{LinkError, Result};
use crate::link::DroneLink;
use std::time::Duration;
use tello_shared::{Command, Reply, ReplyFormat, Response};
use tracing::{debug, info, warn};

/// Executes catalog commands and interprets their replies
pub struct CommandExecutor<'a, L: DroneLink + ?Sized> {
    link: &'a L,
}

impl<'a, L: DroneLink + ?Sized> CommandExecutor<'a, L> {
    /// Create an executor borrowing `link`
    pub fn new(link: &'a L) -> Self {
        Self { link }
    }

    /// Execute a command with the link's default timeout
    pub async fn execute(&self, command: &Command) -> Result<Reply> {
        self.execute_with(command, self.link.default_timeout(), None)
            .await
    }

    /// Execute a command with an explicit timeout
    pub async fn execute_with_timeout(&self, command: &Command, timeout: Duration) -> Result<Reply> {
        self.execute_with(command, timeout, None).await
    }

    /// Execute a command, optionally overriding how its reply is interpreted
    pub async fn execute_with(
        &self,
        command: &Command,
        timeout: Duration,
        format: Option<ReplyFormat>,
    ) -> Result<Reply> {
        info!("Executing command: {}", command);

        let response = self.link.issue(&command.encode(), timeout).await?;
        let format = format.unwrap_or(command.reply_format());

        match response {
            Response::Success(payload) => {
                debug!("  Command completed: '{}'", payload);
                Ok(format.format(&payload)?)
            }
            Response::UnknownCommand(name) => {
                warn!("  Command rejected as unknown: {}", name);
                Err(LinkError::UnknownCommand(name))
            }
            Response::DeviceError(message) => {
                warn!("  Command failed: {}", message);
                Err(LinkError::DeviceError(message))
            }
        }
    }
}
