use crate::bot::resilient::{send_reply_resilient, TelegramPhotoSource};
use crate::bot::router::{InboundUpdate, PhotoRef, Router};
use anyhow::Result;
use std::sync::Arc;
use teloxide::{
    prelude::*,
    types::{ChatAction, Message, PhotoSize},
    utils::command::BotCommands,
};
use tracing::{info, warn};

/// Commands published to the Telegram command menu
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    /// Register the conversation
    #[command(description = "Register yourself to use the bot.")]
    Register,
    /// Show the greeting
    #[command(description = "Start the bot and get an introduction.")]
    Start,
    /// Show the command list
    #[command(description = "Display available commands.")]
    Help,
    /// Chat with the model
    #[command(description = "Chat with AI.")]
    Chat,
    /// Search the web
    #[command(description = "Search the web for information.")]
    Websearch,
    /// Analyze an attached image
    #[command(description = "Send an image for analysis.")]
    Analyze,
}

fn photo_ref(size: &PhotoSize) -> PhotoRef {
    PhotoRef {
        file_id: size.file.id.0.clone(),
        width: size.width,
        height: size.height,
    }
}

/// Map a Telegram message onto the transport-neutral update.
///
/// Captions count as text so a captioned photo keeps its command.
#[must_use]
pub fn inbound_from_message(msg: &Message) -> InboundUpdate {
    InboundUpdate {
        chat_id: msg.chat.id.0,
        username: msg.from.as_ref().and_then(|u| u.username.clone()),
        text: msg.text().or_else(|| msg.caption()).map(str::to_string),
        photos: msg
            .photo()
            .map(|sizes| sizes.iter().map(photo_ref).collect())
            .unwrap_or_default(),
    }
}

/// Whether the router has anything to do with this message
#[must_use]
pub fn is_routable(msg: &Message) -> bool {
    msg.text().is_some() || msg.photo().is_some()
}

/// Route one message and send exactly one reply.
///
/// # Errors
///
/// Returns an error if the reply could not be delivered.
pub async fn handle_message(bot: Bot, msg: Message, router: Arc<Router>) -> Result<()> {
    let update = inbound_from_message(&msg);
    info!(
        chat_id = update.chat_id,
        has_photo = !update.photos.is_empty(),
        "Incoming message"
    );

    if let Err(e) = bot.send_chat_action(msg.chat.id, ChatAction::Typing).await {
        warn!("Failed to send typing action: {e}");
    }

    let photos = TelegramPhotoSource::new(bot.clone());
    let reply = router.handle(&update, &photos).await;
    send_reply_resilient(&bot, msg.chat.id, &reply).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_descriptions_list_every_route() {
        let text = Command::descriptions().to_string();
        for name in ["/register", "/start", "/help", "/chat", "/websearch", "/analyze"] {
            assert!(text.contains(name), "missing {name} in {text}");
        }
    }

    #[test]
    fn test_parse_bare_command() {
        assert!(matches!(
            Command::parse("/websearch", "scout_bot"),
            Ok(Command::Websearch)
        ));
    }
}
