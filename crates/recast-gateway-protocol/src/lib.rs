//! Publisher contract for recast channel gateways.
//!
//! A gateway crate implements [`ChannelPublisher`] for one messaging
//! platform. The pipeline core depends only on this contract, so
//! gateway implementations never depend on the core and can be swapped
//! or stacked freely.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable internal identity of a channel, as observed by the ingestion
/// side. This is the platform-native numeric id, not a display name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(pub i64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Errors surfaced by a channel publisher.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The publishing identity is not a participant of the channel.
    #[error("not a participant of channel {0}")]
    NotMember(ChannelId),

    /// The platform accepted the request and rejected it.
    #[error("publish to channel {channel} failed: {message}")]
    Api { channel: ChannelId, message: String },

    /// The platform was unreachable.
    #[error("transport error for channel {channel}: {message}")]
    Transport { channel: ChannelId, message: String },
}

/// A gateway that can deliver text posts to channels.
#[async_trait]
pub trait ChannelPublisher: Send + Sync {
    /// Whether the publishing identity is currently a participant of
    /// `channel`. Checked before every send so permission failures are
    /// distinguishable from transient delivery failures.
    async fn is_member(&self, channel: ChannelId) -> Result<bool, PublishError>;

    /// Deliver `text` to `channel`.
    async fn send_text(&self, channel: ChannelId, text: &str) -> Result<(), PublishError>;
}
