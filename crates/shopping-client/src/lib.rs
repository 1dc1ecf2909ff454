use std::time::Duration;

use reqwest::Method;
use serde::Serialize;
use shopping_proto::{
    AddItemRequest, AddItemResponse, AddItemsRequest, AddItemsResponse, CompleteListResponse,
    CreateListResponse, CurrentPageResponse, DeleteItemResponse, ErrorResponse, HealthResponse,
    LastMessagesResponse, LastSubscribedListResponse, ListItemsResponse, ListRecord,
    MembershipRequest, NotificationRequest, PreconditionReason, SetLastMessageRequest,
    SetLastSubscribedListRequest, SetPageRequest, SetSkipConfirmRequest, ShareListResponse,
    SkipConfirmResponse, StatusResponse, ToggleItemResponse, UnsubscribeResponse,
    UserActionRequest, UserListsResponse, UserRecord,
};
use thiserror::Error;
use uuid::Uuid;

pub use reqwest::StatusCode;

pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone)]
pub struct ShoppingClientConfig {
    pub base_url: String,
    pub timeout_ms: u64,
}

impl ShoppingClientConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

/// HTTP client for the shopping backend.
///
/// Every call is a single attempt bounded by the configured timeout; failed
/// calls are reported to the caller and never retried.
#[derive(Debug, Clone)]
pub struct ShoppingClient {
    base_url: String,
    timeout: Duration,
    http: reqwest::Client,
}

#[derive(Debug, Error)]
pub enum ShoppingClientError {
    #[error("shopping_client_base_url_missing")]
    BaseUrlMissing,
    #[error("shopping_client_invalid_path")]
    InvalidPath,
    #[error("shopping_request_failed:{message}")]
    Request { message: String },
    #[error("shopping_read_failed:{message}")]
    Read { message: String },
    #[error("shopping_http_{status}:{body}")]
    Http { status: StatusCode, body: String },
    #[error("shopping_json_decode_failed:{message}")]
    Decode { message: String },
}

impl ShoppingClientError {
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }

    /// Business-rule reason carried by a rejected share or unsubscribe.
    #[must_use]
    pub fn reason_code(&self) -> Option<PreconditionReason> {
        let Self::Http { status, body } = self else {
            return None;
        };
        if *status != StatusCode::BAD_REQUEST {
            return None;
        }
        serde_json::from_str::<ErrorResponse>(body)
            .ok()
            .and_then(|error| error.reason_code)
            .and_then(|code| code.parse().ok())
    }
}

impl ShoppingClient {
    pub fn new(config: ShoppingClientConfig) -> Result<Self, ShoppingClientError> {
        let base_url = normalize_base_url(&config.base_url)?;
        Ok(Self {
            base_url,
            timeout: Duration::from_millis(config.timeout_ms.max(250)),
            http: reqwest::Client::new(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn endpoint(&self, path: &str) -> Option<String> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.starts_with('/') {
            Some(format!("{}{}", self.base_url, trimmed))
        } else {
            Some(format!("{}/{}", self.base_url, trimmed))
        }
    }

    #[must_use]
    pub fn health_path() -> &'static str {
        "/health"
    }

    #[must_use]
    pub fn user_actions_path() -> &'static str {
        "/users/actions/"
    }

    #[must_use]
    pub fn user_path(user_id: i64) -> String {
        format!("/users/{user_id}/")
    }

    #[must_use]
    pub fn user_lists_path(user_id: i64) -> String {
        format!("/users/{user_id}/lists/")
    }

    #[must_use]
    pub fn last_subscribed_list_path(user_id: i64) -> String {
        format!("/users/{user_id}/last_subscribed_list/")
    }

    #[must_use]
    pub fn clear_last_subscribed_list_path(user_id: i64) -> String {
        format!("/users/{user_id}/clear_last_subscribed_list/")
    }

    #[must_use]
    pub fn create_list_path(user_id: i64) -> String {
        format!("/lists/?user_id={user_id}")
    }

    #[must_use]
    pub fn list_path(list_id: &str) -> String {
        format!("/lists/{}/", list_id.trim())
    }

    #[must_use]
    pub fn list_items_path(list_id: &str) -> String {
        format!("/lists/{}/items/", list_id.trim())
    }

    #[must_use]
    pub fn bulk_items_path(list_id: &str) -> String {
        format!("/lists/{}/items/bulk/", list_id.trim())
    }

    #[must_use]
    pub fn item_path(list_id: &str, item_id: &str) -> String {
        format!("/lists/{}/items/{}/", list_id.trim(), item_id.trim())
    }

    #[must_use]
    pub fn toggle_item_path(list_id: &str, item_id: &str) -> String {
        format!("/lists/{}/items/{}/toggle/", list_id.trim(), item_id.trim())
    }

    #[must_use]
    pub fn list_action_path(list_id: &str, action: &str) -> String {
        format!("/lists/{}/{}/", list_id.trim(), action)
    }

    #[must_use]
    pub fn ui_state_path(user_id: i64, list_id: &str, field: &str) -> String {
        format!("/utils/{user_id}/lists/{}/{field}/", list_id.trim())
    }

    #[must_use]
    pub fn last_message_delete_one_path(user_id: i64, list_id: &str, message_id: i32) -> String {
        format!(
            "/utils/{user_id}/lists/{}/last_message/{message_id}/delete_one/",
            list_id.trim()
        )
    }

    pub async fn health(&self) -> Result<HealthResponse, ShoppingClientError> {
        self.get_json(Self::health_path()).await
    }

    pub async fn user(&self, user_id: i64) -> Result<Option<UserRecord>, ShoppingClientError> {
        self.get_optional_json(Self::user_path(user_id).as_str())
            .await
    }

    pub async fn record_user_action(
        &self,
        request: &UserActionRequest,
    ) -> Result<StatusResponse, ShoppingClientError> {
        self.send_json(Method::POST, Self::user_actions_path(), Some(request))
            .await
    }

    pub async fn user_lists(&self, user_id: i64) -> Result<Vec<ListRecord>, ShoppingClientError> {
        let response: UserListsResponse = self
            .get_json(Self::user_lists_path(user_id).as_str())
            .await?;
        Ok(response.lists)
    }

    pub async fn last_subscribed_list(
        &self,
        user_id: i64,
    ) -> Result<Option<String>, ShoppingClientError> {
        let response: LastSubscribedListResponse = self
            .get_json(Self::last_subscribed_list_path(user_id).as_str())
            .await?;
        Ok(response.last_subscribed_list_id)
    }

    pub async fn set_last_subscribed_list(
        &self,
        user_id: i64,
        list_id: &str,
    ) -> Result<StatusResponse, ShoppingClientError> {
        let payload = SetLastSubscribedListRequest {
            list_id: list_id.to_string(),
        };
        self.send_json(
            Method::POST,
            Self::last_subscribed_list_path(user_id).as_str(),
            Some(&payload),
        )
        .await
    }

    pub async fn clear_last_subscribed_list(
        &self,
        user_id: i64,
    ) -> Result<StatusResponse, ShoppingClientError> {
        self.send_json::<(), _>(
            Method::POST,
            Self::clear_last_subscribed_list_path(user_id).as_str(),
            None,
        )
        .await
    }

    pub async fn create_list(&self, user_id: i64) -> Result<String, ShoppingClientError> {
        let response: CreateListResponse = self
            .send_json::<(), _>(Method::POST, Self::create_list_path(user_id).as_str(), None)
            .await?;
        Ok(response.list_id)
    }

    pub async fn list(&self, list_id: &str) -> Result<Option<ListRecord>, ShoppingClientError> {
        self.get_optional_json(Self::list_path(list_id).as_str())
            .await
    }

    pub async fn list_items(
        &self,
        list_id: &str,
    ) -> Result<ListItemsResponse, ShoppingClientError> {
        self.get_json(Self::list_items_path(list_id).as_str())
            .await
    }

    pub async fn add_item(
        &self,
        list_id: &str,
        item_name: &str,
    ) -> Result<AddItemResponse, ShoppingClientError> {
        let payload = AddItemRequest {
            item_name: item_name.to_string(),
        };
        self.send_json(
            Method::POST,
            Self::list_items_path(list_id).as_str(),
            Some(&payload),
        )
        .await
    }

    pub async fn add_items(
        &self,
        list_id: &str,
        names: &[String],
    ) -> Result<AddItemsResponse, ShoppingClientError> {
        let payload = AddItemsRequest::from_names(names.iter().cloned());
        self.send_json(
            Method::POST,
            Self::bulk_items_path(list_id).as_str(),
            Some(&payload),
        )
        .await
    }

    pub async fn toggle_item(
        &self,
        list_id: &str,
        item_id: &str,
    ) -> Result<ToggleItemResponse, ShoppingClientError> {
        self.send_json::<(), _>(
            Method::PUT,
            Self::toggle_item_path(list_id, item_id).as_str(),
            None,
        )
        .await
    }

    pub async fn delete_item(
        &self,
        list_id: &str,
        item_id: &str,
    ) -> Result<DeleteItemResponse, ShoppingClientError> {
        self.send_json::<(), _>(
            Method::DELETE,
            Self::item_path(list_id, item_id).as_str(),
            None,
        )
        .await
    }

    pub async fn complete_list(
        &self,
        list_id: &str,
    ) -> Result<CompleteListResponse, ShoppingClientError> {
        self.send_json::<(), _>(
            Method::POST,
            Self::list_action_path(list_id, "complete").as_str(),
            None,
        )
        .await
    }

    pub async fn share_list(
        &self,
        list_id: &str,
        user_id: i64,
    ) -> Result<ShareListResponse, ShoppingClientError> {
        self.send_json(
            Method::POST,
            Self::list_action_path(list_id, "share").as_str(),
            Some(&MembershipRequest { user_id }),
        )
        .await
    }

    pub async fn unsubscribe(
        &self,
        list_id: &str,
        user_id: i64,
    ) -> Result<UnsubscribeResponse, ShoppingClientError> {
        self.send_json(
            Method::POST,
            Self::list_action_path(list_id, "unsubscribe").as_str(),
            Some(&MembershipRequest { user_id }),
        )
        .await
    }

    pub async fn set_notification(
        &self,
        list_id: &str,
        text: &str,
    ) -> Result<StatusResponse, ShoppingClientError> {
        let payload = NotificationRequest {
            notification_text: text.to_string(),
        };
        self.send_json(
            Method::POST,
            Self::list_action_path(list_id, "notification").as_str(),
            Some(&payload),
        )
        .await
    }

    pub async fn clear_notification(
        &self,
        list_id: &str,
    ) -> Result<StatusResponse, ShoppingClientError> {
        self.send_json::<(), _>(
            Method::POST,
            Self::list_action_path(list_id, "clear_notification").as_str(),
            None,
        )
        .await
    }

    pub async fn current_page(
        &self,
        user_id: i64,
        list_id: &str,
    ) -> Result<u32, ShoppingClientError> {
        let response: CurrentPageResponse = self
            .get_json(Self::ui_state_path(user_id, list_id, "current_page").as_str())
            .await?;
        Ok(response.current_page)
    }

    pub async fn set_current_page(
        &self,
        user_id: i64,
        list_id: &str,
        page: u32,
    ) -> Result<StatusResponse, ShoppingClientError> {
        self.send_json(
            Method::POST,
            Self::ui_state_path(user_id, list_id, "current_page").as_str(),
            Some(&SetPageRequest { page }),
        )
        .await
    }

    pub async fn clear_current_page(
        &self,
        user_id: i64,
        list_id: &str,
    ) -> Result<StatusResponse, ShoppingClientError> {
        self.send_json::<(), _>(
            Method::DELETE,
            Self::ui_state_path(user_id, list_id, "current_page").as_str(),
            None,
        )
        .await
    }

    pub async fn skip_confirm(
        &self,
        user_id: i64,
        list_id: &str,
    ) -> Result<bool, ShoppingClientError> {
        let response: SkipConfirmResponse = self
            .get_json(Self::ui_state_path(user_id, list_id, "skip_confirm").as_str())
            .await?;
        Ok(response.skip_confirm)
    }

    pub async fn set_skip_confirm(
        &self,
        user_id: i64,
        list_id: &str,
        value: bool,
    ) -> Result<StatusResponse, ShoppingClientError> {
        self.send_json(
            Method::POST,
            Self::ui_state_path(user_id, list_id, "skip_confirm").as_str(),
            Some(&SetSkipConfirmRequest { value }),
        )
        .await
    }

    pub async fn clear_skip_confirm(
        &self,
        user_id: i64,
        list_id: &str,
    ) -> Result<StatusResponse, ShoppingClientError> {
        self.send_json::<(), _>(
            Method::DELETE,
            Self::ui_state_path(user_id, list_id, "skip_confirm").as_str(),
            None,
        )
        .await
    }

    pub async fn last_messages(
        &self,
        user_id: i64,
        list_id: &str,
    ) -> Result<Vec<i32>, ShoppingClientError> {
        let response: LastMessagesResponse = self
            .get_json(Self::ui_state_path(user_id, list_id, "last_message").as_str())
            .await?;
        Ok(response.last_message_ids)
    }

    pub async fn push_last_message(
        &self,
        user_id: i64,
        list_id: &str,
        message_id: i32,
    ) -> Result<StatusResponse, ShoppingClientError> {
        self.send_json(
            Method::POST,
            Self::ui_state_path(user_id, list_id, "last_message").as_str(),
            Some(&SetLastMessageRequest { message_id }),
        )
        .await
    }

    pub async fn remove_last_message(
        &self,
        user_id: i64,
        list_id: &str,
        message_id: i32,
    ) -> Result<StatusResponse, ShoppingClientError> {
        self.send_json::<(), _>(
            Method::DELETE,
            Self::last_message_delete_one_path(user_id, list_id, message_id).as_str(),
            None,
        )
        .await
    }

    pub async fn clear_last_messages(
        &self,
        user_id: i64,
        list_id: &str,
    ) -> Result<StatusResponse, ShoppingClientError> {
        self.send_json::<(), _>(
            Method::DELETE,
            Self::ui_state_path(user_id, list_id, "last_message/clear").as_str(),
            None,
        )
        .await
    }

    pub async fn get_json<T>(&self, path: &str) -> Result<T, ShoppingClientError>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        let response = self.send::<()>(Method::GET, path, None).await?;
        decode_json_response(response).await
    }

    pub async fn get_optional_json<T>(&self, path: &str) -> Result<Option<T>, ShoppingClientError>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        let response = self.send::<()>(Method::GET, path, None).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        decode_json_response(response).await.map(Some)
    }

    pub async fn send_json<Req, Res>(
        &self,
        method: Method,
        path: &str,
        payload: Option<&Req>,
    ) -> Result<Res, ShoppingClientError>
    where
        Req: Serialize + ?Sized,
        Res: for<'de> serde::Deserialize<'de>,
    {
        let response = self.send(method, path, payload).await?;
        decode_json_response(response).await
    }

    async fn send<Req>(
        &self,
        method: Method,
        path: &str,
        payload: Option<&Req>,
    ) -> Result<reqwest::Response, ShoppingClientError>
    where
        Req: Serialize + ?Sized,
    {
        let url = self.endpoint(path).ok_or(ShoppingClientError::InvalidPath)?;
        let request_id = format!("req_{}", Uuid::new_v4().simple());
        tracing::debug!(%method, %url, %request_id, "shopping backend request");
        let mut request = self
            .http
            .request(method, url.as_str())
            .header("x-request-id", request_id)
            .timeout(self.timeout);
        if let Some(payload) = payload {
            request = request.json(payload);
        }
        request
            .send()
            .await
            .map_err(|error| ShoppingClientError::Request {
                message: error.to_string(),
            })
    }
}

pub fn format_http_error(status: StatusCode, body: &[u8]) -> ShoppingClientError {
    let body = non_empty_string(String::from_utf8_lossy(body).to_string())
        .unwrap_or_else(|| "<empty>".to_string());
    ShoppingClientError::Http { status, body }
}

fn normalize_base_url(base_url: &str) -> Result<String, ShoppingClientError> {
    let trimmed = base_url.trim();
    if trimmed.is_empty() {
        return Err(ShoppingClientError::BaseUrlMissing);
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

async fn decode_json_response<T>(response: reqwest::Response) -> Result<T, ShoppingClientError>
where
    T: for<'de> serde::Deserialize<'de>,
{
    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .map_err(|error| ShoppingClientError::Read {
            message: error.to_string(),
        })?;

    if !status.is_success() {
        return Err(format_http_error(status, &bytes));
    }

    serde_json::from_slice::<T>(&bytes).map_err(|error| ShoppingClientError::Decode {
        message: error.to_string(),
    })
}

fn non_empty_string(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
