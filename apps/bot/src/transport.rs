use async_trait::async_trait;
use teloxide::{
    ApiError, RequestError,
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup, MessageId, ParseMode},
};
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::render::Keyboard;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("message is not modified")]
    NotModified,
    #[error("chat transport rejected the request: {0}")]
    Rejected(String),
    #[error("chat transport unreachable: {0}")]
    Network(String),
}

/// Outbound side of the chat transport. Every text is sent as HTML.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Returns the id of the new message.
    async fn send_html(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<i32, TransportError>;

    async fn edit_html(
        &self,
        chat_id: i64,
        message_id: i32,
        text: &str,
        keyboard: &Keyboard,
    ) -> Result<(), TransportError>;

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<(), TransportError>;

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
        show_alert: bool,
    ) -> Result<(), TransportError>;

    async fn bot_username(&self) -> Result<String, TransportError>;
}

pub struct TelegramTransport {
    bot: Bot,
    username: OnceCell<String>,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self {
            bot,
            username: OnceCell::new(),
        }
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn send_html(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<i32, TransportError> {
        let mut request = self
            .bot
            .send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::Html);
        if let Some(keyboard) = keyboard {
            request = request.reply_markup(inline_markup(keyboard));
        }
        let message = request.await.map_err(map_request_error)?;
        Ok(message.id.0)
    }

    async fn edit_html(
        &self,
        chat_id: i64,
        message_id: i32,
        text: &str,
        keyboard: &Keyboard,
    ) -> Result<(), TransportError> {
        self.bot
            .edit_message_text(ChatId(chat_id), MessageId(message_id), text)
            .parse_mode(ParseMode::Html)
            .reply_markup(inline_markup(keyboard))
            .await
            .map_err(map_request_error)?;
        Ok(())
    }

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<(), TransportError> {
        self.bot
            .delete_message(ChatId(chat_id), MessageId(message_id))
            .await
            .map_err(map_request_error)?;
        Ok(())
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
        show_alert: bool,
    ) -> Result<(), TransportError> {
        let mut request = self.bot.answer_callback_query(callback_id);
        if let Some(text) = text {
            request = request.text(text).show_alert(show_alert);
        }
        request.await.map_err(map_request_error)?;
        Ok(())
    }

    async fn bot_username(&self) -> Result<String, TransportError> {
        self.username
            .get_or_try_init(|| async {
                let me = self.bot.get_me().await.map_err(map_request_error)?;
                me.user
                    .username
                    .clone()
                    .ok_or_else(|| TransportError::Rejected("bot has no username".to_string()))
            })
            .await
            .cloned()
    }
}

fn inline_markup(keyboard: &Keyboard) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(keyboard.rows.iter().map(|row| {
        row.iter()
            .map(|button| InlineKeyboardButton::callback(button.text.clone(), button.action.to_string()))
            .collect::<Vec<_>>()
    }))
}

fn map_request_error(error: RequestError) -> TransportError {
    match error {
        RequestError::Api(ApiError::MessageNotModified) => TransportError::NotModified,
        RequestError::Network(error) => TransportError::Network(error.to_string()),
        RequestError::Io(error) => TransportError::Network(error.to_string()),
        other => TransportError::Rejected(other.to_string()),
    }
}
