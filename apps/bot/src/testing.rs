//! In-process fakes: the real list service over the memory store, and a chat
//! transport that records every call.

use std::collections::BTreeMap;

use async_trait::async_trait;
use shopping_backend_service::{
    service::{ListError, ListService},
    store,
};
use shopping_client::{ShoppingClientError, StatusCode};
use shopping_proto::{CompleteListResponse, ListRecord, STATUS_OK, UserRecord};
use tokio::sync::Mutex;

use crate::{
    backend::ListBackend,
    render::Keyboard,
    transport::{ChatTransport, TransportError},
};

pub const BOT_USERNAME: &str = "shopping_list_bot";

pub struct ServiceBackend {
    service: ListService,
}

impl ServiceBackend {
    pub fn new() -> Self {
        Self {
            service: ListService::new(store::memory()),
        }
    }
}

fn client_error(error: ListError) -> ShoppingClientError {
    let status = match &error {
        ListError::InvalidRequest(_) | ListError::PreconditionFailed { .. } => {
            StatusCode::BAD_REQUEST
        }
        ListError::NotFound(_) => StatusCode::NOT_FOUND,
        ListError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let reason_code = match &error {
        ListError::PreconditionFailed { reason } => Some(reason.as_str()),
        _ => None,
    };
    let body = serde_json::json!({
        "error": error.code(),
        "message": error.message(),
        "reason_code": reason_code,
    });
    ShoppingClientError::Http {
        status,
        body: body.to_string(),
    }
}

fn optional<T>(result: Result<T, ListError>) -> Result<Option<T>, ShoppingClientError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(ListError::NotFound(_)) => Ok(None),
        Err(error) => Err(client_error(error)),
    }
}

#[async_trait]
impl ListBackend for ServiceBackend {
    async fn record_user_action(
        &self,
        user_id: i64,
        chat_id: i64,
        username: Option<&str>,
    ) -> Result<(), ShoppingClientError> {
        self.service
            .record_action(user_id, chat_id, username.map(ToString::to_string))
            .await
            .map_err(client_error)
    }

    async fn user(&self, user_id: i64) -> Result<Option<UserRecord>, ShoppingClientError> {
        optional(self.service.user(user_id).await)
    }

    async fn user_lists(&self, user_id: i64) -> Result<Vec<ListRecord>, ShoppingClientError> {
        self.service.user_lists(user_id).await.map_err(client_error)
    }

    async fn last_subscribed_list(
        &self,
        user_id: i64,
    ) -> Result<Option<String>, ShoppingClientError> {
        self.service
            .last_subscribed_list(user_id)
            .await
            .map_err(client_error)
    }

    async fn create_list(&self, user_id: i64) -> Result<String, ShoppingClientError> {
        self.service
            .create_list(user_id)
            .await
            .map(|list| list.list_id)
            .map_err(client_error)
    }

    async fn list(&self, list_id: &str) -> Result<Option<ListRecord>, ShoppingClientError> {
        optional(self.service.list(list_id).await)
    }

    async fn add_items(
        &self,
        list_id: &str,
        names: &[String],
    ) -> Result<Vec<String>, ShoppingClientError> {
        self.service
            .add_items(list_id, names.to_vec())
            .await
            .map(|items| items.into_iter().map(|item| item.name).collect())
            .map_err(client_error)
    }

    async fn toggle_item(&self, list_id: &str, item_id: &str) -> Result<bool, ShoppingClientError> {
        self.service
            .toggle_item(list_id, item_id)
            .await
            .map_err(client_error)
    }

    async fn delete_item(&self, list_id: &str, item_id: &str) -> Result<bool, ShoppingClientError> {
        self.service
            .delete_item(list_id, item_id)
            .await
            .map_err(client_error)
    }

    async fn complete_list(
        &self,
        list_id: &str,
    ) -> Result<CompleteListResponse, ShoppingClientError> {
        let snapshot = self
            .service
            .complete_list(list_id)
            .await
            .map_err(client_error)?;
        Ok(CompleteListResponse {
            status: STATUS_OK.to_string(),
            users: snapshot.users,
            items: snapshot.items,
            last_message_ids_for_users: snapshot.last_message_ids_for_users,
        })
    }

    async fn share_list(&self, list_id: &str, user_id: i64) -> Result<(), ShoppingClientError> {
        self.service
            .share_list(list_id, user_id)
            .await
            .map_err(client_error)
    }

    async fn unsubscribe(&self, list_id: &str, user_id: i64) -> Result<(), ShoppingClientError> {
        self.service
            .unsubscribe(list_id, user_id)
            .await
            .map_err(client_error)
    }

    async fn current_page(&self, user_id: i64, list_id: &str) -> Result<u32, ShoppingClientError> {
        self.service
            .current_page(user_id, list_id)
            .await
            .map_err(client_error)
    }

    async fn set_current_page(
        &self,
        user_id: i64,
        list_id: &str,
        page: u32,
    ) -> Result<(), ShoppingClientError> {
        self.service
            .set_current_page(user_id, list_id, page)
            .await
            .map_err(client_error)
    }

    async fn skip_confirm(&self, user_id: i64, list_id: &str) -> Result<bool, ShoppingClientError> {
        self.service
            .skip_confirm(user_id, list_id)
            .await
            .map_err(client_error)
    }

    async fn set_skip_confirm(
        &self,
        user_id: i64,
        list_id: &str,
        value: bool,
    ) -> Result<(), ShoppingClientError> {
        self.service
            .set_skip_confirm(user_id, list_id, value)
            .await
            .map_err(client_error)
    }

    async fn clear_skip_confirm(
        &self,
        user_id: i64,
        list_id: &str,
    ) -> Result<(), ShoppingClientError> {
        self.service
            .clear_skip_confirm(user_id, list_id)
            .await
            .map_err(client_error)
    }

    async fn last_messages(
        &self,
        user_id: i64,
        list_id: &str,
    ) -> Result<Vec<i32>, ShoppingClientError> {
        self.service
            .last_messages(user_id, list_id)
            .await
            .map_err(client_error)
    }

    async fn push_last_message(
        &self,
        user_id: i64,
        list_id: &str,
        message_id: i32,
    ) -> Result<(), ShoppingClientError> {
        self.service
            .push_last_message(user_id, list_id, message_id)
            .await
            .map_err(client_error)
    }

    async fn remove_last_message(
        &self,
        user_id: i64,
        list_id: &str,
        message_id: i32,
    ) -> Result<(), ShoppingClientError> {
        self.service
            .remove_last_message(user_id, list_id, message_id)
            .await
            .map_err(client_error)
    }

    async fn set_notification(
        &self,
        list_id: &str,
        text: &str,
    ) -> Result<(), ShoppingClientError> {
        self.service
            .set_notification(list_id, text)
            .await
            .map_err(client_error)
    }

    async fn clear_notification(&self, list_id: &str) -> Result<(), ShoppingClientError> {
        self.service
            .clear_notification(list_id)
            .await
            .map_err(client_error)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Send {
        chat_id: i64,
        message_id: i32,
        text: String,
        keyboard: Option<Keyboard>,
    },
    Edit {
        chat_id: i64,
        message_id: i32,
        text: String,
    },
    Delete {
        chat_id: i64,
        message_id: i32,
    },
    Answer {
        callback_id: String,
        text: Option<String>,
        show_alert: bool,
    },
}

#[derive(Debug)]
struct LiveMessage {
    chat_id: i64,
    text: String,
}

#[derive(Debug, Default)]
struct TransportLog {
    next_message_id: i32,
    live: BTreeMap<i32, LiveMessage>,
    calls: Vec<TransportCall>,
    /// Sends and edits fail while set; deletes and answers still go through.
    offline: bool,
}

/// Chat transport that keeps the messages it "sent" so edits and deletes of
/// unknown messages fail the way a real chat does.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    log: Mutex<TransportLog>,
}

impl RecordingTransport {
    pub async fn set_offline(&self, offline: bool) {
        self.log.lock().await.offline = offline;
    }

    pub async fn calls(&self) -> Vec<TransportCall> {
        self.log.lock().await.calls.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.log
            .lock()
            .await
            .calls
            .iter()
            .filter(|call| matches!(call, TransportCall::Send { .. }))
            .count()
    }

    /// Texts of every message sent to `chat_id`, in order.
    pub async fn sent_to(&self, chat_id: i64) -> Vec<String> {
        self.log
            .lock()
            .await
            .calls
            .iter()
            .filter_map(|call| match call {
                TransportCall::Send {
                    chat_id: target,
                    text,
                    ..
                } if *target == chat_id => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub async fn answers(&self) -> Vec<(Option<String>, bool)> {
        self.log
            .lock()
            .await
            .calls
            .iter()
            .filter_map(|call| match call {
                TransportCall::Answer {
                    text, show_alert, ..
                } => Some((text.clone(), *show_alert)),
                _ => None,
            })
            .collect()
    }

    pub async fn text_of(&self, message_id: i32) -> Option<String> {
        self.log
            .lock()
            .await
            .live
            .get(&message_id)
            .map(|message| message.text.clone())
    }

    /// Ids of messages still visible in `chat_id`.
    pub async fn live_in(&self, chat_id: i64) -> Vec<i32> {
        self.log
            .lock()
            .await
            .live
            .iter()
            .filter(|(_, message)| message.chat_id == chat_id)
            .map(|(message_id, _)| *message_id)
            .collect()
    }

    /// Registers a message the user sent, so the bot can delete it.
    pub async fn incoming(&self, chat_id: i64, text: &str) -> i32 {
        let mut log = self.log.lock().await;
        log.next_message_id += 1;
        let message_id = log.next_message_id;
        log.live.insert(
            message_id,
            LiveMessage {
                chat_id,
                text: text.to_string(),
            },
        );
        message_id
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send_html(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<i32, TransportError> {
        let mut log = self.log.lock().await;
        if log.offline {
            return Err(TransportError::Network("chat unreachable".to_string()));
        }
        log.next_message_id += 1;
        let message_id = log.next_message_id;
        log.live.insert(
            message_id,
            LiveMessage {
                chat_id,
                text: text.to_string(),
            },
        );
        log.calls.push(TransportCall::Send {
            chat_id,
            message_id,
            text: text.to_string(),
            keyboard: keyboard.cloned(),
        });
        Ok(message_id)
    }

    async fn edit_html(
        &self,
        chat_id: i64,
        message_id: i32,
        text: &str,
        _keyboard: &Keyboard,
    ) -> Result<(), TransportError> {
        let mut log = self.log.lock().await;
        if log.offline {
            return Err(TransportError::Network("chat unreachable".to_string()));
        }
        let Some(message) = log
            .live
            .get_mut(&message_id)
            .filter(|message| message.chat_id == chat_id)
        else {
            return Err(TransportError::Rejected(
                "message to edit not found".to_string(),
            ));
        };
        if message.text == text {
            return Err(TransportError::NotModified);
        }
        message.text = text.to_string();
        log.calls.push(TransportCall::Edit {
            chat_id,
            message_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<(), TransportError> {
        let mut log = self.log.lock().await;
        log.calls.push(TransportCall::Delete {
            chat_id,
            message_id,
        });
        match log.live.remove(&message_id) {
            Some(_) => Ok(()),
            None => Err(TransportError::Rejected(
                "message to delete not found".to_string(),
            )),
        }
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
        show_alert: bool,
    ) -> Result<(), TransportError> {
        self.log.lock().await.calls.push(TransportCall::Answer {
            callback_id: callback_id.to_string(),
            text: text.map(ToString::to_string),
            show_alert,
        });
        Ok(())
    }

    async fn bot_username(&self) -> Result<String, TransportError> {
        Ok(BOT_USERNAME.to_string())
    }
}
