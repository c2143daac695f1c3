//! Resilient messaging utilities with automatic retry for Telegram API operations.
//!
//! # Usage
//!
//! ```ignore
//! use gemini_scout::bot::resilient::send_reply_resilient;
//!
//! send_reply_resilient(&bot, chat_id, "Hello!").await?;
//! ```

use crate::bot::router::{DownloadedFile, PhotoRef, PhotoSource};
use crate::config::TELEGRAM_MESSAGE_LIMIT;
use crate::utils::{fit_message, retry_telegram_operation};
use anyhow::Result;
use async_trait::async_trait;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{ChatId, FileId, Message};
use tracing::debug;

/// Send a plain-text reply with automatic retry on network failures.
///
/// Replies longer than Telegram allows are cut so the update still gets
/// exactly one message.
///
/// # Errors
///
/// Returns an error after all retries are exhausted.
pub async fn send_reply_resilient(bot: &Bot, chat_id: ChatId, text: &str) -> Result<Message> {
    let text = fit_message(text, TELEGRAM_MESSAGE_LIMIT);
    retry_telegram_operation(|| async {
        bot.send_message(chat_id, text.clone())
            .await
            .map_err(|e| anyhow::anyhow!("Telegram send error: {e}"))
    })
    .await
}

/// Downloads photos through the Bot API
#[derive(Clone)]
pub struct TelegramPhotoSource {
    bot: Bot,
}

impl TelegramPhotoSource {
    /// Wrap a bot handle
    #[must_use]
    pub const fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl PhotoSource for TelegramPhotoSource {
    async fn fetch(&self, photo: &PhotoRef) -> Result<DownloadedFile> {
        let (file_path, bytes) = retry_telegram_operation(|| async {
            let file = self.bot.get_file(FileId(photo.file_id.clone())).await?;
            let mut buf = Vec::new();
            self.bot.download_file(&file.path, &mut buf).await?;
            Ok((file.path, buf))
        })
        .await?;

        debug!(file_path = %file_path, size = bytes.len(), "Photo downloaded");
        Ok(DownloadedFile { file_path, bytes })
    }
}
