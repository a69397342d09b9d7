//! Outbound publishing seam. The Telegram client is a black-box
//! collaborator behind the `Publisher` trait so the poller can be exercised
//! with a test double. No retry policy here: a failed send is logged by the
//! caller and the next cycle is the retry mechanism.

use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{LinkPreviewOptions, ParseMode};

use crate::render::OutputMode;

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Send one formatted message to a chat/channel.
    async fn send(&self, chat: &str, text: &str, mode: OutputMode) -> Result<()>;
}

pub struct TelegramPublisher {
    bot: Bot,
}

impl TelegramPublisher {
    pub fn new(token: &str) -> Self {
        Self {
            bot: Bot::new(token),
        }
    }

    /// Verify the credential and return the bot's username. Called once at
    /// startup; failure means a bad token and is fatal upstream.
    pub async fn identity(&self) -> Result<String> {
        let me = self.bot.get_me().await.context("calling getMe")?;
        Ok(me.username().to_string())
    }
}

fn parse_mode_for(mode: OutputMode) -> ParseMode {
    match mode {
        OutputMode::MarkdownV2 => ParseMode::MarkdownV2,
        OutputMode::Html => ParseMode::Html,
    }
}

#[async_trait]
impl Publisher for TelegramPublisher {
    async fn send(&self, chat: &str, text: &str, mode: OutputMode) -> Result<()> {
        // Previews of the entry link just repeat the post; keep them off.
        let no_preview = LinkPreviewOptions {
            is_disabled: true,
            url: None,
            prefer_small_media: false,
            prefer_large_media: false,
            show_above_text: false,
        };
        self.bot
            .send_message(chat.to_string(), text)
            .parse_mode(parse_mode_for(mode))
            .link_preview_options(no_preview)
            .await
            .context("sending message")?;
        Ok(())
    }
}
