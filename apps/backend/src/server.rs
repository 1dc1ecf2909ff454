use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use shopping_proto::{
    AddItemRequest, AddItemResponse, AddItemsRequest, AddItemsResponse, CompleteListResponse,
    CreateListResponse, CurrentPageResponse, DeleteItemResponse, LastMessagesResponse,
    LastSubscribedListResponse, ListItemsResponse, ListRecord, MembershipRequest,
    NotificationRequest, STATUS_OK, SetLastMessageRequest, SetLastSubscribedListRequest,
    SetPageRequest, SetSkipConfirmRequest, ShareListResponse, SkipConfirmResponse, StatusResponse,
    ToggleItemResponse, UnsubscribeResponse, UserActionRequest, UserListsResponse, UserRecord,
};

use crate::{
    config::Config,
    service::{ListError, ListService},
};


#[derive(Clone)]
pub struct AppState {
    config: Config,
    lists: ListService,
    started_at: chrono::DateTime<Utc>,
}

impl AppState {
    #[must_use]
    pub fn new(config: Config, lists: ListService) -> Self {
        Self {
            config,
            lists,
            started_at: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: String,
    build_sha: String,
    store_driver: &'static str,
    uptime_seconds: i64,
}

#[derive(Debug, Deserialize)]
struct CreateListQuery {
    user_id: i64,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/users/actions/", post(record_user_action))
        .route("/users/:user_id/", get(get_user))
        .route("/users/:user_id/lists/", get(get_user_lists))
        .route(
            "/users/:user_id/last_subscribed_list/",
            get(get_last_subscribed_list)
                .post(set_last_subscribed_list)
                .delete(clear_last_subscribed_list),
        )
        .route(
            "/users/:user_id/clear_last_subscribed_list/",
            post(clear_last_subscribed_list),
        )
        .route("/lists/", post(create_list))
        .route("/lists/:list_id/", get(get_list))
        .route("/lists/:list_id/items/", get(get_items).post(add_item))
        .route("/lists/:list_id/items/bulk/", post(add_items))
        .route("/lists/:list_id/items/:item_id/", delete(delete_item))
        .route("/lists/:list_id/items/:item_id/toggle/", put(toggle_item))
        .route("/lists/:list_id/complete/", post(complete_list))
        .route("/lists/:list_id/share/", post(share_list))
        .route("/lists/:list_id/unsubscribe/", post(unsubscribe))
        .route("/lists/:list_id/notification/", post(set_notification))
        .route(
            "/lists/:list_id/clear_notification/",
            post(clear_notification),
        )
        .route(
            "/utils/:user_id/lists/:list_id/current_page/",
            get(get_current_page)
                .post(set_current_page)
                .delete(clear_current_page),
        )
        .route(
            "/utils/:user_id/lists/:list_id/skip_confirm/",
            get(get_skip_confirm)
                .post(set_skip_confirm)
                .delete(clear_skip_confirm),
        )
        .route(
            "/utils/:user_id/lists/:list_id/last_message/",
            get(get_last_messages).post(push_last_message),
        )
        .route(
            "/utils/:user_id/lists/:list_id/last_message/clear/",
            delete(clear_last_messages),
        )
        .route(
            "/utils/:user_id/lists/:list_id/last_message/:message_id/",
            delete(remove_last_message),
        )
        .route(
            "/utils/:user_id/lists/:list_id/last_message/:message_id/delete_one/",
            delete(remove_last_message),
        )
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime_seconds = (Utc::now() - state.started_at).num_seconds();
    Json(HealthResponse {
        status: STATUS_OK,
        service: state.config.service_name.clone(),
        build_sha: state.config.build_sha.clone(),
        store_driver: state.config.store_driver(),
        uptime_seconds,
    })
}

async fn record_user_action(
    State(state): State<AppState>,
    Json(payload): Json<UserActionRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    tracing::debug!(user_id = payload.user_id, "recording user action");
    state
        .lists
        .record_action(payload.user_id, payload.chat_id, payload.username)
        .await
        .map_err(ApiError::from_list)?;
    Ok(Json(StatusResponse::new("user action recorded")))
}

async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<UserRecord>, ApiError> {
    let user = state
        .lists
        .user(user_id)
        .await
        .map_err(ApiError::from_list)?;
    Ok(Json(user))
}

async fn get_user_lists(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<UserListsResponse>, ApiError> {
    let lists = state
        .lists
        .user_lists(user_id)
        .await
        .map_err(ApiError::from_list)?;
    Ok(Json(UserListsResponse { lists }))
}

async fn get_last_subscribed_list(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<LastSubscribedListResponse>, ApiError> {
    let last_subscribed_list_id = state
        .lists
        .last_subscribed_list(user_id)
        .await
        .map_err(ApiError::from_list)?;
    Ok(Json(LastSubscribedListResponse {
        last_subscribed_list_id,
    }))
}

async fn set_last_subscribed_list(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(payload): Json<SetLastSubscribedListRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    state
        .lists
        .set_last_subscribed_list(user_id, &payload.list_id)
        .await
        .map_err(ApiError::from_list)?;
    Ok(Json(StatusResponse::new("last subscribed list updated")))
}

async fn clear_last_subscribed_list(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<StatusResponse>, ApiError> {
    state
        .lists
        .clear_last_subscribed_list(user_id)
        .await
        .map_err(ApiError::from_list)?;
    Ok(Json(StatusResponse::new("last subscribed list cleared")))
}

async fn create_list(
    State(state): State<AppState>,
    Query(query): Query<CreateListQuery>,
) -> Result<Json<CreateListResponse>, ApiError> {
    let list = state
        .lists
        .create_list(query.user_id)
        .await
        .map_err(ApiError::from_list)?;
    Ok(Json(CreateListResponse {
        list_id: list.list_id,
    }))
}

async fn get_list(
    State(state): State<AppState>,
    Path(list_id): Path<String>,
) -> Result<Json<ListRecord>, ApiError> {
    let list = state
        .lists
        .list(&list_id)
        .await
        .map_err(ApiError::from_list)?;
    Ok(Json(list))
}

async fn get_items(
    State(state): State<AppState>,
    Path(list_id): Path<String>,
) -> Result<Json<ListItemsResponse>, ApiError> {
    let items = state
        .lists
        .items(&list_id)
        .await
        .map_err(ApiError::from_list)?;
    Ok(Json(ListItemsResponse { items }))
}

async fn add_item(
    State(state): State<AppState>,
    Path(list_id): Path<String>,
    Json(payload): Json<AddItemRequest>,
) -> Result<Json<AddItemResponse>, ApiError> {
    tracing::debug!(list_id = %list_id, "adding item");
    let item = state
        .lists
        .add_item(&list_id, &payload.item_name)
        .await
        .map_err(ApiError::from_list)?;
    Ok(Json(AddItemResponse {
        status: "item added".to_string(),
        item_id: item.item_id,
    }))
}

async fn add_items(
    State(state): State<AppState>,
    Path(list_id): Path<String>,
    Json(payload): Json<AddItemsRequest>,
) -> Result<Json<AddItemsResponse>, ApiError> {
    tracing::debug!(list_id = %list_id, count = payload.items.len(), "adding items");
    let names = payload
        .items
        .into_iter()
        .map(|item| item.item_name)
        .collect();
    let added = state
        .lists
        .add_items(&list_id, names)
        .await
        .map_err(ApiError::from_list)?;
    let (item_ids, added_items) = added
        .into_iter()
        .map(|item| (item.item_id, item.name))
        .unzip();
    Ok(Json(AddItemsResponse {
        added_items,
        item_ids,
    }))
}

async fn toggle_item(
    State(state): State<AppState>,
    Path((list_id, item_id)): Path<(String, String)>,
) -> Result<Json<ToggleItemResponse>, ApiError> {
    let bought = state
        .lists
        .toggle_item(&list_id, &item_id)
        .await
        .map_err(ApiError::from_list)?;
    Ok(Json(ToggleItemResponse {
        status: "item toggled".to_string(),
        bought,
    }))
}

async fn delete_item(
    State(state): State<AppState>,
    Path((list_id, item_id)): Path<(String, String)>,
) -> Result<Json<DeleteItemResponse>, ApiError> {
    let deleted = state
        .lists
        .delete_item(&list_id, &item_id)
        .await
        .map_err(ApiError::from_list)?;
    Ok(Json(DeleteItemResponse {
        status: "item deleted".to_string(),
        deleted,
    }))
}

async fn complete_list(
    State(state): State<AppState>,
    Path(list_id): Path<String>,
) -> Result<Json<CompleteListResponse>, ApiError> {
    let snapshot = state
        .lists
        .complete_list(&list_id)
        .await
        .map_err(ApiError::from_list)?;
    Ok(Json(CompleteListResponse {
        status: "list completed".to_string(),
        users: snapshot.users,
        items: snapshot.items,
        last_message_ids_for_users: snapshot.last_message_ids_for_users,
    }))
}

async fn share_list(
    State(state): State<AppState>,
    Path(list_id): Path<String>,
    Json(payload): Json<MembershipRequest>,
) -> Result<Json<ShareListResponse>, ApiError> {
    state
        .lists
        .share_list(&list_id, payload.user_id)
        .await
        .map_err(ApiError::from_list)?;
    Ok(Json(ShareListResponse {
        status: "list shared".to_string(),
        user_added: payload.user_id,
    }))
}

async fn unsubscribe(
    State(state): State<AppState>,
    Path(list_id): Path<String>,
    Json(payload): Json<MembershipRequest>,
) -> Result<Json<UnsubscribeResponse>, ApiError> {
    state
        .lists
        .unsubscribe(&list_id, payload.user_id)
        .await
        .map_err(ApiError::from_list)?;
    Ok(Json(UnsubscribeResponse {
        status: "unsubscribed".to_string(),
        user_removed: payload.user_id,
    }))
}

async fn set_notification(
    State(state): State<AppState>,
    Path(list_id): Path<String>,
    Json(payload): Json<NotificationRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    state
        .lists
        .set_notification(&list_id, &payload.notification_text)
        .await
        .map_err(ApiError::from_list)?;
    Ok(Json(StatusResponse::new("notification set")))
}

async fn clear_notification(
    State(state): State<AppState>,
    Path(list_id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    state
        .lists
        .clear_notification(&list_id)
        .await
        .map_err(ApiError::from_list)?;
    Ok(Json(StatusResponse::new("notification cleared")))
}

async fn get_current_page(
    State(state): State<AppState>,
    Path((user_id, list_id)): Path<(i64, String)>,
) -> Result<Json<CurrentPageResponse>, ApiError> {
    let current_page = state
        .lists
        .current_page(user_id, &list_id)
        .await
        .map_err(ApiError::from_list)?;
    Ok(Json(CurrentPageResponse { current_page }))
}

async fn set_current_page(
    State(state): State<AppState>,
    Path((user_id, list_id)): Path<(i64, String)>,
    Json(payload): Json<SetPageRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    state
        .lists
        .set_current_page(user_id, &list_id, payload.page)
        .await
        .map_err(ApiError::from_list)?;
    Ok(Json(StatusResponse::new("current page updated")))
}

async fn clear_current_page(
    State(state): State<AppState>,
    Path((user_id, list_id)): Path<(i64, String)>,
) -> Result<Json<StatusResponse>, ApiError> {
    state
        .lists
        .clear_current_page(user_id, &list_id)
        .await
        .map_err(ApiError::from_list)?;
    Ok(Json(StatusResponse::new("current page cleared")))
}

async fn get_skip_confirm(
    State(state): State<AppState>,
    Path((user_id, list_id)): Path<(i64, String)>,
) -> Result<Json<SkipConfirmResponse>, ApiError> {
    let skip_confirm = state
        .lists
        .skip_confirm(user_id, &list_id)
        .await
        .map_err(ApiError::from_list)?;
    Ok(Json(SkipConfirmResponse { skip_confirm }))
}

async fn set_skip_confirm(
    State(state): State<AppState>,
    Path((user_id, list_id)): Path<(i64, String)>,
    Json(payload): Json<SetSkipConfirmRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    state
        .lists
        .set_skip_confirm(user_id, &list_id, payload.value)
        .await
        .map_err(ApiError::from_list)?;
    Ok(Json(StatusResponse::new("skip confirm updated")))
}

async fn clear_skip_confirm(
    State(state): State<AppState>,
    Path((user_id, list_id)): Path<(i64, String)>,
) -> Result<Json<StatusResponse>, ApiError> {
    state
        .lists
        .clear_skip_confirm(user_id, &list_id)
        .await
        .map_err(ApiError::from_list)?;
    Ok(Json(StatusResponse::new("skip confirm cleared")))
}

async fn get_last_messages(
    State(state): State<AppState>,
    Path((user_id, list_id)): Path<(i64, String)>,
) -> Result<Json<LastMessagesResponse>, ApiError> {
    let last_message_ids = state
        .lists
        .last_messages(user_id, &list_id)
        .await
        .map_err(ApiError::from_list)?;
    Ok(Json(LastMessagesResponse { last_message_ids }))
}

async fn push_last_message(
    State(state): State<AppState>,
    Path((user_id, list_id)): Path<(i64, String)>,
    Json(payload): Json<SetLastMessageRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    state
        .lists
        .push_last_message(user_id, &list_id, payload.message_id)
        .await
        .map_err(ApiError::from_list)?;
    Ok(Json(StatusResponse::new("last message recorded")))
}

async fn remove_last_message(
    State(state): State<AppState>,
    Path((user_id, list_id, message_id)): Path<(i64, String, i32)>,
) -> Result<Json<StatusResponse>, ApiError> {
    state
        .lists
        .remove_last_message(user_id, &list_id, message_id)
        .await
        .map_err(ApiError::from_list)?;
    Ok(Json(StatusResponse::new("last message removed")))
}

async fn clear_last_messages(
    State(state): State<AppState>,
    Path((user_id, list_id)): Path<(i64, String)>,
) -> Result<Json<StatusResponse>, ApiError> {
    state
        .lists
        .clear_last_messages(user_id, &list_id)
        .await
        .map_err(ApiError::from_list)?;
    Ok(Json(StatusResponse::new("last messages cleared")))
}

#[derive(Debug)]
enum ApiError {
    InvalidRequest(String),
    NotFound(String),
    PreconditionFailed {
        reason_code: &'static str,
        message: String,
    },
    Internal(String),
}

impl ApiError {
    fn from_list(error: ListError) -> Self {
        match error {
            ListError::InvalidRequest(message) => Self::InvalidRequest(message),
            ListError::NotFound(message) => Self::NotFound(message),
            ListError::PreconditionFailed { reason } => Self::PreconditionFailed {
                reason_code: reason.as_str(),
                message: reason.message().to_string(),
            },
            ListError::Internal(message) => Self::Internal(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::InvalidRequest(message) => (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "error": "invalid_request",
                    "message": message,
                })),
            )
                .into_response(),
            Self::NotFound(message) => (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({
                    "error": "not_found",
                    "message": message,
                })),
            )
                .into_response(),
            Self::PreconditionFailed {
                reason_code,
                message,
            } => (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "error": "precondition_failed",
                    "message": message,
                    "reason_code": reason_code,
                })),
            )
                .into_response(),
            Self::Internal(message) => {
                tracing::error!(reason = %message, "shopping request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({
                        "error": "internal_error",
                        "message": message,
                    })),
                )
                    .into_response()
            }
        }
    }
}
