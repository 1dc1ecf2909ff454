use async_trait::async_trait;
use shopping_client::{ShoppingClient, ShoppingClientError};
use shopping_proto::{CompleteListResponse, ListRecord, UserActionRequest, UserRecord};

/// Backend operations the bot depends on.
#[async_trait]
pub trait ListBackend: Send + Sync {
    async fn record_user_action(
        &self,
        user_id: i64,
        chat_id: i64,
        username: Option<&str>,
    ) -> Result<(), ShoppingClientError>;

    async fn user(&self, user_id: i64) -> Result<Option<UserRecord>, ShoppingClientError>;

    async fn user_lists(&self, user_id: i64) -> Result<Vec<ListRecord>, ShoppingClientError>;

    async fn last_subscribed_list(&self, user_id: i64)
    -> Result<Option<String>, ShoppingClientError>;

    async fn create_list(&self, user_id: i64) -> Result<String, ShoppingClientError>;

    async fn list(&self, list_id: &str) -> Result<Option<ListRecord>, ShoppingClientError>;

    /// Returns the names that were actually added.
    async fn add_items(
        &self,
        list_id: &str,
        names: &[String],
    ) -> Result<Vec<String>, ShoppingClientError>;

    async fn toggle_item(&self, list_id: &str, item_id: &str) -> Result<bool, ShoppingClientError>;

    async fn delete_item(&self, list_id: &str, item_id: &str) -> Result<bool, ShoppingClientError>;

    async fn complete_list(
        &self,
        list_id: &str,
    ) -> Result<CompleteListResponse, ShoppingClientError>;

    async fn share_list(&self, list_id: &str, user_id: i64) -> Result<(), ShoppingClientError>;

    async fn unsubscribe(&self, list_id: &str, user_id: i64) -> Result<(), ShoppingClientError>;

    async fn current_page(&self, user_id: i64, list_id: &str) -> Result<u32, ShoppingClientError>;

    async fn set_current_page(
        &self,
        user_id: i64,
        list_id: &str,
        page: u32,
    ) -> Result<(), ShoppingClientError>;

    async fn skip_confirm(&self, user_id: i64, list_id: &str) -> Result<bool, ShoppingClientError>;

    async fn set_skip_confirm(
        &self,
        user_id: i64,
        list_id: &str,
        value: bool,
    ) -> Result<(), ShoppingClientError>;

    async fn clear_skip_confirm(
        &self,
        user_id: i64,
        list_id: &str,
    ) -> Result<(), ShoppingClientError>;

    async fn last_messages(
        &self,
        user_id: i64,
        list_id: &str,
    ) -> Result<Vec<i32>, ShoppingClientError>;

    async fn push_last_message(
        &self,
        user_id: i64,
        list_id: &str,
        message_id: i32,
    ) -> Result<(), ShoppingClientError>;

    async fn remove_last_message(
        &self,
        user_id: i64,
        list_id: &str,
        message_id: i32,
    ) -> Result<(), ShoppingClientError>;

    async fn set_notification(&self, list_id: &str, text: &str)
    -> Result<(), ShoppingClientError>;

    async fn clear_notification(&self, list_id: &str) -> Result<(), ShoppingClientError>;
}

#[async_trait]
impl ListBackend for ShoppingClient {
    async fn record_user_action(
        &self,
        user_id: i64,
        chat_id: i64,
        username: Option<&str>,
    ) -> Result<(), ShoppingClientError> {
        let request = UserActionRequest {
            user_id,
            chat_id,
            username: username.map(ToString::to_string),
        };
        ShoppingClient::record_user_action(self, &request).await?;
        Ok(())
    }

    async fn user(&self, user_id: i64) -> Result<Option<UserRecord>, ShoppingClientError> {
        ShoppingClient::user(self, user_id).await
    }

    async fn user_lists(&self, user_id: i64) -> Result<Vec<ListRecord>, ShoppingClientError> {
        ShoppingClient::user_lists(self, user_id).await
    }

    async fn last_subscribed_list(
        &self,
        user_id: i64,
    ) -> Result<Option<String>, ShoppingClientError> {
        ShoppingClient::last_subscribed_list(self, user_id).await
    }

    async fn create_list(&self, user_id: i64) -> Result<String, ShoppingClientError> {
        ShoppingClient::create_list(self, user_id).await
    }

    async fn list(&self, list_id: &str) -> Result<Option<ListRecord>, ShoppingClientError> {
        ShoppingClient::list(self, list_id).await
    }

    async fn add_items(
        &self,
        list_id: &str,
        names: &[String],
    ) -> Result<Vec<String>, ShoppingClientError> {
        Ok(ShoppingClient::add_items(self, list_id, names)
            .await?
            .added_items)
    }

    async fn toggle_item(&self, list_id: &str, item_id: &str) -> Result<bool, ShoppingClientError> {
        Ok(ShoppingClient::toggle_item(self, list_id, item_id)
            .await?
            .bought)
    }

    async fn delete_item(&self, list_id: &str, item_id: &str) -> Result<bool, ShoppingClientError> {
        Ok(ShoppingClient::delete_item(self, list_id, item_id)
            .await?
            .deleted)
    }

    async fn complete_list(
        &self,
        list_id: &str,
    ) -> Result<CompleteListResponse, ShoppingClientError> {
        ShoppingClient::complete_list(self, list_id).await
    }

    async fn share_list(&self, list_id: &str, user_id: i64) -> Result<(), ShoppingClientError> {
        ShoppingClient::share_list(self, list_id, user_id).await?;
        Ok(())
    }

    async fn unsubscribe(&self, list_id: &str, user_id: i64) -> Result<(), ShoppingClientError> {
        ShoppingClient::unsubscribe(self, list_id, user_id).await?;
        Ok(())
    }

    async fn current_page(&self, user_id: i64, list_id: &str) -> Result<u32, ShoppingClientError> {
        ShoppingClient::current_page(self, user_id, list_id).await
    }

    async fn set_current_page(
        &self,
        user_id: i64,
        list_id: &str,
        page: u32,
    ) -> Result<(), ShoppingClientError> {
        ShoppingClient::set_current_page(self, user_id, list_id, page).await?;
        Ok(())
    }

    async fn skip_confirm(&self, user_id: i64, list_id: &str) -> Result<bool, ShoppingClientError> {
        ShoppingClient::skip_confirm(self, user_id, list_id).await
    }

    async fn set_skip_confirm(
        &self,
        user_id: i64,
        list_id: &str,
        value: bool,
    ) -> Result<(), ShoppingClientError> {
        ShoppingClient::set_skip_confirm(self, user_id, list_id, value).await?;
        Ok(())
    }

    async fn clear_skip_confirm(
        &self,
        user_id: i64,
        list_id: &str,
    ) -> Result<(), ShoppingClientError> {
        ShoppingClient::clear_skip_confirm(self, user_id, list_id).await?;
        Ok(())
    }

    async fn last_messages(
        &self,
        user_id: i64,
        list_id: &str,
    ) -> Result<Vec<i32>, ShoppingClientError> {
        ShoppingClient::last_messages(self, user_id, list_id).await
    }

    async fn push_last_message(
        &self,
        user_id: i64,
        list_id: &str,
        message_id: i32,
    ) -> Result<(), ShoppingClientError> {
        ShoppingClient::push_last_message(self, user_id, list_id, message_id).await?;
        Ok(())
    }

    async fn remove_last_message(
        &self,
        user_id: i64,
        list_id: &str,
        message_id: i32,
    ) -> Result<(), ShoppingClientError> {
        ShoppingClient::remove_last_message(self, user_id, list_id, message_id).await?;
        Ok(())
    }

    async fn set_notification(
        &self,
        list_id: &str,
        text: &str,
    ) -> Result<(), ShoppingClientError> {
        ShoppingClient::set_notification(self, list_id, text).await?;
        Ok(())
    }

    async fn clear_notification(&self, list_id: &str) -> Result<(), ShoppingClientError> {
        ShoppingClient::clear_notification(self, list_id).await?;
        Ok(())
    }
}
