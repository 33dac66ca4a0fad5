//! Chat transport trait — the platform operations enforcement needs.
//!
//! The pipeline never talks to a chat platform directly; it goes through
//! this trait so tests can record calls and deployments can plug in
//! whatever gateway they run.

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::error::TransportError;

/// Platform-side operations required by enforcement.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Remove a message from its channel.
    async fn delete_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<(), TransportError>;

    /// Mute a member for a duration.
    async fn timeout_member(
        &self,
        community_id: &str,
        user_id: &str,
        duration: Duration,
        reason: &str,
    ) -> Result<(), TransportError>;

    /// Deliver a private notice to a user. May fail when the user blocks
    /// DMs; enforcement treats that as non-fatal.
    async fn send_direct_notice(&self, user_id: &str, text: &str) -> Result<(), TransportError>;

    /// Post a notice in a channel, optionally auto-deleting after
    /// `auto_expire`.
    async fn send_channel_notice(
        &self,
        channel_id: &str,
        text: &str,
        auto_expire: Option<Duration>,
    ) -> Result<(), TransportError>;
}

/// Transport that only logs. Used by the demo binary, where no real chat
/// platform is attached.
pub struct LoggingTransport;

#[async_trait]
impl ChatTransport for LoggingTransport {
    async fn delete_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<(), TransportError> {
        info!(channel_id, message_id, "Would delete message");
        Ok(())
    }

    async fn timeout_member(
        &self,
        community_id: &str,
        user_id: &str,
        duration: Duration,
        reason: &str,
    ) -> Result<(), TransportError> {
        info!(community_id, user_id, ?duration, reason, "Would timeout member");
        Ok(())
    }

    async fn send_direct_notice(&self, user_id: &str, text: &str) -> Result<(), TransportError> {
        info!(user_id, text, "Would send DM");
        Ok(())
    }

    async fn send_channel_notice(
        &self,
        channel_id: &str,
        text: &str,
        auto_expire: Option<Duration>,
    ) -> Result<(), TransportError> {
        info!(channel_id, text, ?auto_expire, "Would post channel notice");
        Ok(())
    }
}
