//! Delivery of a rendered list into one chat.
//!
//! The newest stored message id is edited in place. A message that can no
//! longer be edited is deleted, forgotten, and replaced by a fresh one.

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::{
    backend::ListBackend,
    render::ListView,
    transport::{ChatTransport, TransportError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    NoMessage,
    Editable(i32),
    Stale(i32),
}

impl DeliveryState {
    /// History is ordered newest first.
    #[must_use]
    pub fn from_history(history: &[i32]) -> Self {
        history
            .first()
            .map_or(Self::NoMessage, |message_id| Self::Editable(*message_id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Edited(i32),
    Sent(i32),
}

impl DeliveryOutcome {
    #[must_use]
    pub fn message_id(self) -> i32 {
        match self {
            Self::Edited(message_id) | Self::Sent(message_id) => message_id,
        }
    }
}

pub struct DeliveryTarget<'a> {
    pub chat_id: i64,
    pub user_id: i64,
    pub list_id: &'a str,
}

pub async fn deliver(
    backend: &dyn ListBackend,
    transport: &dyn ChatTransport,
    target: &DeliveryTarget<'_>,
    view: &ListView,
) -> Result<DeliveryOutcome> {
    let history = match backend.last_messages(target.user_id, target.list_id).await {
        Ok(history) => history,
        Err(error) => {
            warn!(
                user_id = target.user_id,
                list_id = target.list_id,
                reason = %error,
                "failed to load rendered message history"
            );
            Vec::new()
        }
    };

    let mut state = DeliveryState::from_history(&history);
    loop {
        state = match state {
            DeliveryState::Editable(message_id) => {
                match transport
                    .edit_html(target.chat_id, message_id, &view.text, &view.keyboard)
                    .await
                {
                    Ok(()) | Err(TransportError::NotModified) => {
                        debug!(message_id, list_id = target.list_id, "list message edited");
                        return Ok(DeliveryOutcome::Edited(message_id));
                    }
                    Err(error) => {
                        warn!(
                            message_id,
                            list_id = target.list_id,
                            reason = %error,
                            "stored list message is stale"
                        );
                        DeliveryState::Stale(message_id)
                    }
                }
            }
            DeliveryState::Stale(message_id) => {
                if let Err(error) = transport.delete_message(target.chat_id, message_id).await {
                    debug!(message_id, reason = %error, "stale list message was not deleted");
                }
                if let Err(error) = backend
                    .remove_last_message(target.user_id, target.list_id, message_id)
                    .await
                {
                    warn!(
                        message_id,
                        list_id = target.list_id,
                        reason = %error,
                        "failed to forget stale list message"
                    );
                }
                DeliveryState::NoMessage
            }
            DeliveryState::NoMessage => {
                let message_id = transport
                    .send_html(target.chat_id, &view.text, Some(&view.keyboard))
                    .await
                    .context("failed to send list message")?;
                backend
                    .push_last_message(target.user_id, target.list_id, message_id)
                    .await
                    .context("failed to record list message")?;
                debug!(message_id, list_id = target.list_id, "list message sent");
                return Ok(DeliveryOutcome::Sent(message_id));
            }
        };
    }
}
