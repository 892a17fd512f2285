//! Telegram channel publisher backed by the Bot API.
//!
//! Channel identities are the raw Telegram chat ids that the ingestion
//! side records (`-100…` for channels). The membership check uses
//! `getChatMember` with the bot's own user id, so the bot must be able
//! to see the chat at all for the check to pass.

use async_trait::async_trait;
use serde::Deserialize;
use teloxide::RequestError;
use teloxide::prelude::*;
use teloxide::types::{ChatId, UserId};
use tracing::debug;

use recast_gateway_protocol::{ChannelId, ChannelPublisher, PublishError};

/// Configuration for the Telegram publisher.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    /// Bot API token.
    pub bot_token: String,
}

/// Publishes text posts to Telegram channels via the Bot API.
pub struct TelegramPublisher {
    bot: Bot,
    bot_user_id: UserId,
}

impl TelegramPublisher {
    /// Connect to the Bot API and resolve the bot's own identity,
    /// which the membership check needs.
    pub async fn connect(config: TelegramConfig) -> Result<Self, RequestError> {
        let bot = Bot::new(config.bot_token);
        let me = bot.get_me().await?;
        debug!(username = %me.username(), "Telegram publisher connected");
        Ok(Self {
            bot,
            bot_user_id: me.id,
        })
    }
}

fn map_request_error(channel: ChannelId, err: RequestError) -> PublishError {
    match err {
        RequestError::Network(e) => PublishError::Transport {
            channel,
            message: e.to_string(),
        },
        other => PublishError::Api {
            channel,
            message: other.to_string(),
        },
    }
}

#[async_trait]
impl ChannelPublisher for TelegramPublisher {
    async fn is_member(&self, channel: ChannelId) -> Result<bool, PublishError> {
        let member = self
            .bot
            .get_chat_member(ChatId(channel.0), self.bot_user_id)
            .await
            .map_err(|e| map_request_error(channel, e))?;
        Ok(member.is_present())
    }

    async fn send_text(&self, channel: ChannelId, text: &str) -> Result<(), PublishError> {
        self.bot
            .send_message(ChatId(channel.0), text)
            .await
            .map_err(|e| map_request_error(channel, e))?;
        debug!(channel = %channel, "message delivered");
        Ok(())
    }
}
