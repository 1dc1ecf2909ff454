use std::sync::Arc;

use anyhow::Result;
use teloxide::{
    prelude::*,
    types::{Message, User},
};
use tracing::{error, warn};

use crate::actions::{BotActions, Inbound, Sender};

/// `Some(payload)` when `text` is a `/start` command.
fn start_command(text: &str) -> Option<Option<&str>> {
    let mut words = text.split_whitespace();
    let command = words.next()?;
    let is_start = command == "/start"
        || command
            .strip_prefix("/start@")
            .is_some_and(|bot| !bot.is_empty());
    is_start.then(|| words.next())
}

fn sender_from(user: &User, chat_id: i64) -> Option<Sender> {
    let Ok(user_id) = i64::try_from(user.id.0) else {
        warn!(user_id = user.id.0, "telegram user id does not fit the backend");
        return None;
    };
    Some(Sender {
        user_id,
        chat_id,
        username: user.username.clone(),
    })
}

pub async fn handle_message(msg: Message, actions: Arc<BotActions>) -> Result<()> {
    let Some(sender) = msg.from().and_then(|user| sender_from(user, msg.chat.id.0)) else {
        return Ok(());
    };

    let outcome = match msg.text() {
        Some(text) => match start_command(text) {
            Some(payload) => actions.start(&sender, payload).await,
            None => actions.message(&sender, msg.id.0, Inbound::Text(text)).await,
        },
        None => {
            actions
                .message(&sender, msg.id.0, Inbound::Unsupported)
                .await
        }
    };
    if let Err(error) = outcome {
        error!(user_id = sender.user_id, reason = %error, "message handling failed");
    }
    Ok(())
}

pub async fn handle_callback(q: CallbackQuery, actions: Arc<BotActions>) -> Result<()> {
    // Private chats share the user's id, so it stands in when the message is gone.
    let chat_id = q
        .message
        .as_ref()
        .map_or_else(|| i64::try_from(q.from.id.0).unwrap_or_default(), |message| message.chat.id.0);
    let Some(sender) = sender_from(&q.from, chat_id) else {
        return Ok(());
    };
    let message_id = q.message.as_ref().map(|message| message.id.0);
    let data = q.data.as_deref().unwrap_or_default();

    if let Err(error) = actions.callback(&sender, &q.id, message_id, data).await {
        error!(user_id = sender.user_id, data, reason = %error, "callback handling failed");
    }
    Ok(())
}
