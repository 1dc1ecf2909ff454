//! Wire contracts shared by the shopping backend and its chat front end.
//!
//! Every type here mirrors one JSON body of the backend HTTP surface. Domain
//! behavior lives in the backend service and the bot; this crate only fixes
//! field names and shapes.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cap for the most-recent-first sequences (`last_actions`, `last_list_messages`).
pub const RECENT_HISTORY_LIMIT: usize = 3;

pub const STATUS_OK: &str = "ok";

/// Length of list and item ids: 12 bytes, lowercase hex.
pub const RECORD_ID_LEN: usize = 24;

/// Whether `value` has the shape of a list or item id.
pub fn is_record_id(value: &str) -> bool {
    value.len() == RECORD_ID_LEN
        && value
            .bytes()
            .all(|byte| byte.is_ascii_digit() || (b'a'..=b'f').contains(&byte))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub item_id: String,
    pub name: String,
    #[serde(default)]
    pub bought: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRecord {
    pub list_id: String,
    pub owner_id: i64,
    #[serde(default)]
    pub users: Vec<i64>,
    #[serde(default)]
    pub items: Vec<ItemRecord>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_notification_text: Option<String>,
}

impl ListRecord {
    #[must_use]
    pub fn is_member(&self, user_id: i64) -> bool {
        self.users.contains(&user_id)
    }

    #[must_use]
    pub fn item(&self, item_id: &str) -> Option<&ItemRecord> {
        self.items.iter().find(|item| item.item_id == item_id)
    }

    #[must_use]
    pub fn all_bought(&self) -> bool {
        !self.items.is_empty() && self.items.iter().all(|item| item.bought)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: i64,
    #[serde(default)]
    pub chat_id: Option<i64>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub list_ids: Vec<String>,
    #[serde(default)]
    pub last_subscribed_list_id: Option<String>,
    #[serde(default)]
    pub last_actions: Vec<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    #[must_use]
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserActionRequest {
    pub user_id: i64,
    pub chat_id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserListsResponse {
    pub lists: Vec<ListRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastSubscribedListResponse {
    pub last_subscribed_list_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetLastSubscribedListRequest {
    pub list_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateListResponse {
    pub list_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListItemsResponse {
    pub items: Vec<ItemRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddItemRequest {
    pub item_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddItemResponse {
    pub status: String,
    pub item_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddItemsRequest {
    pub items: Vec<AddItemRequest>,
}

impl AddItemsRequest {
    #[must_use]
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            items: names
                .into_iter()
                .map(|name| AddItemRequest {
                    item_name: name.into(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddItemsResponse {
    pub added_items: Vec<String>,
    #[serde(default)]
    pub item_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToggleItemResponse {
    pub status: String,
    pub bought: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteItemResponse {
    pub status: String,
    pub deleted: bool,
}

/// Snapshot returned when a list is completed and removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteListResponse {
    pub status: String,
    pub users: Vec<i64>,
    pub items: Vec<ItemRecord>,
    /// Pending rendered message ids, keyed by member user id.
    #[serde(default)]
    pub last_message_ids_for_users: BTreeMap<i64, Vec<i32>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipRequest {
    pub user_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareListResponse {
    pub status: String,
    pub user_added: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnsubscribeResponse {
    pub status: String,
    pub user_removed: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentPageResponse {
    pub current_page: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetPageRequest {
    pub page: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkipConfirmResponse {
    pub skip_confirm: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetSkipConfirmRequest {
    pub value: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastMessagesResponse {
    pub last_message_ids: Vec<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetLastMessageRequest {
    pub message_id: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub notification_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub reason_code: Option<String>,
}

/// Machine-readable reason for a rejected share or unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreconditionReason {
    AlreadyMember,
    SubscribedElsewhere,
    NotMember,
    OwnerCannotUnsubscribe,
}

impl PreconditionReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AlreadyMember => "already_member",
            Self::SubscribedElsewhere => "subscribed_elsewhere",
            Self::NotMember => "not_member",
            Self::OwnerCannotUnsubscribe => "owner_cannot_unsubscribe",
        }
    }

    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::AlreadyMember => "user is already a member of this list",
            Self::SubscribedElsewhere => "user is already subscribed to another shared list",
            Self::NotMember => "user is not a member of this list",
            Self::OwnerCannotUnsubscribe => "the list owner cannot unsubscribe",
        }
    }
}

impl fmt::Display for PreconditionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PreconditionReason {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "already_member" => Ok(Self::AlreadyMember),
            "subscribed_elsewhere" => Ok(Self::SubscribedElsewhere),
            "not_member" => Ok(Self::NotMember),
            "owner_cannot_unsubscribe" => Ok(Self::OwnerCannotUnsubscribe),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}
