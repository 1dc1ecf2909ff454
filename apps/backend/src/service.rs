use std::sync::Arc;

use chrono::Utc;
use shopping_proto::{ItemRecord, ListRecord, PreconditionReason, UserRecord};

use crate::store::{
    CompletionSnapshot, ShareOutcome, ShoppingStore, StoreError, UnsubscribeOutcome, UserAction,
};

#[derive(Debug, thiserror::Error)]
pub enum ListError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("precondition failed: {reason}")]
    PreconditionFailed { reason: PreconditionReason },
    #[error("internal error: {0}")]
    Internal(String),
}

impl ListError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::NotFound(_) => "not_found",
            Self::PreconditionFailed { .. } => "precondition_failed",
            Self::Internal(_) => "internal_error",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::InvalidRequest(message) | Self::NotFound(message) | Self::Internal(message) => {
                message.clone()
            }
            Self::PreconditionFailed { reason } => reason.message().to_string(),
        }
    }
}

impl From<StoreError> for ListError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(message) => Self::NotFound(message),
            StoreError::Db(message) => Self::Internal(message),
        }
    }
}

#[derive(Clone)]
pub struct ListService {
    store: Arc<dyn ShoppingStore>,
}

impl ListService {
    pub fn new(store: Arc<dyn ShoppingStore>) -> Self {
        Self { store }
    }

    pub async fn user(&self, user_id: i64) -> Result<UserRecord, ListError> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or_else(|| ListError::NotFound(format!("user {user_id}")))
    }

    pub async fn record_action(
        &self,
        user_id: i64,
        chat_id: i64,
        username: Option<String>,
    ) -> Result<(), ListError> {
        let username = username
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        self.store
            .record_user_action(UserAction {
                user_id,
                chat_id,
                username,
                at: Utc::now(),
            })
            .await?;
        Ok(())
    }

    pub async fn user_lists(&self, user_id: i64) -> Result<Vec<ListRecord>, ListError> {
        Ok(self.store.list_user_lists(user_id).await?)
    }

    pub async fn last_subscribed_list(&self, user_id: i64) -> Result<Option<String>, ListError> {
        Ok(self.store.get_last_subscribed_list(user_id).await?)
    }

    pub async fn set_last_subscribed_list(
        &self,
        user_id: i64,
        list_id: &str,
    ) -> Result<(), ListError> {
        if self.store.set_last_subscribed_list(user_id, list_id).await? {
            Ok(())
        } else {
            Err(ListError::NotFound(format!(
                "list {list_id} for user {user_id}"
            )))
        }
    }

    pub async fn clear_last_subscribed_list(&self, user_id: i64) -> Result<(), ListError> {
        Ok(self.store.clear_last_subscribed_list(user_id).await?)
    }

    pub async fn create_list(&self, owner_id: i64) -> Result<ListRecord, ListError> {
        let list = self.store.create_list(owner_id).await?;
        tracing::info!(list_id = %list.list_id, owner_id, "shopping list created");
        Ok(list)
    }

    pub async fn list(&self, list_id: &str) -> Result<ListRecord, ListError> {
        self.store
            .get_list(list_id)
            .await?
            .ok_or_else(|| ListError::NotFound(format!("list {list_id}")))
    }

    pub async fn items(&self, list_id: &str) -> Result<Vec<ItemRecord>, ListError> {
        Ok(self.list(list_id).await?.items)
    }

    pub async fn add_item(&self, list_id: &str, name: &str) -> Result<ItemRecord, ListError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ListError::InvalidRequest(
                "item_name must not be blank".to_string(),
            ));
        }
        Ok(self.store.add_item(list_id, name.to_string()).await?)
    }

    /// Blank names are dropped; the remaining ones keep their order.
    pub async fn add_items(
        &self,
        list_id: &str,
        names: Vec<String>,
    ) -> Result<Vec<ItemRecord>, ListError> {
        let names: Vec<String> = names
            .into_iter()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();
        Ok(self.store.add_items(list_id, names).await?)
    }

    pub async fn toggle_item(&self, list_id: &str, item_id: &str) -> Result<bool, ListError> {
        Ok(self.store.toggle_item(list_id, item_id).await?)
    }

    pub async fn delete_item(&self, list_id: &str, item_id: &str) -> Result<bool, ListError> {
        Ok(self.store.delete_item(list_id, item_id).await?)
    }

    pub async fn complete_list(&self, list_id: &str) -> Result<CompletionSnapshot, ListError> {
        let snapshot = self
            .store
            .complete_list(list_id)
            .await?
            .ok_or_else(|| ListError::NotFound(format!("list {list_id}")))?;
        tracing::info!(
            list_id,
            members = snapshot.users.len(),
            items = snapshot.items.len(),
            "shopping list completed"
        );
        Ok(snapshot)
    }

    pub async fn share_list(&self, list_id: &str, user_id: i64) -> Result<(), ListError> {
        match self.store.share_list(list_id, user_id).await? {
            ShareOutcome::Shared => {
                tracing::info!(list_id, user_id, "shopping list shared");
                Ok(())
            }
            ShareOutcome::ListNotFound => Err(ListError::NotFound(format!("list {list_id}"))),
            ShareOutcome::AlreadyMember => Err(ListError::PreconditionFailed {
                reason: PreconditionReason::AlreadyMember,
            }),
            ShareOutcome::SubscribedElsewhere => Err(ListError::PreconditionFailed {
                reason: PreconditionReason::SubscribedElsewhere,
            }),
        }
    }

    pub async fn unsubscribe(&self, list_id: &str, user_id: i64) -> Result<(), ListError> {
        match self.store.unsubscribe(list_id, user_id).await? {
            UnsubscribeOutcome::Unsubscribed => {
                tracing::info!(list_id, user_id, "user unsubscribed from shopping list");
                Ok(())
            }
            UnsubscribeOutcome::ListNotFound => {
                Err(ListError::NotFound(format!("list {list_id}")))
            }
            UnsubscribeOutcome::NotMember => Err(ListError::PreconditionFailed {
                reason: PreconditionReason::NotMember,
            }),
            UnsubscribeOutcome::OwnerCannotUnsubscribe => Err(ListError::PreconditionFailed {
                reason: PreconditionReason::OwnerCannotUnsubscribe,
            }),
        }
    }

    pub async fn current_page(&self, user_id: i64, list_id: &str) -> Result<u32, ListError> {
        Ok(self.store.get_current_page(user_id, list_id).await?)
    }

    pub async fn set_current_page(
        &self,
        user_id: i64,
        list_id: &str,
        page: u32,
    ) -> Result<(), ListError> {
        if page == 0 {
            return Err(ListError::InvalidRequest(
                "page must be at least 1".to_string(),
            ));
        }
        Ok(self.store.set_current_page(user_id, list_id, page).await?)
    }

    pub async fn clear_current_page(&self, user_id: i64, list_id: &str) -> Result<(), ListError> {
        Ok(self.store.clear_current_page(user_id, list_id).await?)
    }

    pub async fn skip_confirm(&self, user_id: i64, list_id: &str) -> Result<bool, ListError> {
        Ok(self.store.get_skip_confirm(user_id, list_id).await?)
    }

    pub async fn set_skip_confirm(
        &self,
        user_id: i64,
        list_id: &str,
        value: bool,
    ) -> Result<(), ListError> {
        Ok(self.store.set_skip_confirm(user_id, list_id, value).await?)
    }

    pub async fn clear_skip_confirm(&self, user_id: i64, list_id: &str) -> Result<(), ListError> {
        Ok(self.store.clear_skip_confirm(user_id, list_id).await?)
    }

    pub async fn last_messages(&self, user_id: i64, list_id: &str) -> Result<Vec<i32>, ListError> {
        Ok(self.store.get_list_messages(user_id, list_id).await?)
    }

    pub async fn push_last_message(
        &self,
        user_id: i64,
        list_id: &str,
        message_id: i32,
    ) -> Result<(), ListError> {
        Ok(self
            .store
            .push_list_message(user_id, list_id, message_id)
            .await?)
    }

    pub async fn remove_last_message(
        &self,
        user_id: i64,
        list_id: &str,
        message_id: i32,
    ) -> Result<(), ListError> {
        Ok(self
            .store
            .remove_list_message(user_id, list_id, message_id)
            .await?)
    }

    pub async fn clear_last_messages(&self, user_id: i64, list_id: &str) -> Result<(), ListError> {
        Ok(self.store.clear_list_messages(user_id, list_id).await?)
    }

    pub async fn set_notification(&self, list_id: &str, text: &str) -> Result<(), ListError> {
        Ok(self.store.set_notification(list_id, text).await?)
    }

    pub async fn clear_notification(&self, list_id: &str) -> Result<(), ListError> {
        Ok(self.store.clear_notification(list_id).await?)
    }
}
