//! Inline-button payloads.
//!
//! Payloads are underscore-delimited (`toggle_{list}_{item}_{page}`). List and
//! item ids are hex so they never contain the delimiter, and every payload
//! stays inside the 64-byte limit of the chat transport.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListCallback {
    SortList { list_id: String, page: u32 },
    Complete { list_id: String },
    ConfirmComplete { list_id: String },
    CancelComplete { list_id: String },
    Prev { list_id: String, page: u32 },
    Next { list_id: String, page: u32 },
    Page { list_id: String, page: u32 },
    DisabledPrev,
    DisabledNext,
    Share { list_id: String },
    Unsubscribe { list_id: String },
    Toggle { list_id: String, item_id: String, page: u32 },
    Delete { list_id: String, item_id: String, page: u32 },
    Label { list_id: String, item_id: String, page: u32 },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CallbackParseError {
    #[error("empty callback payload")]
    Empty,
    #[error("unknown callback payload: {0}")]
    Unknown(String),
    #[error("invalid page in callback payload: {0}")]
    InvalidPage(String),
}

impl ListCallback {
    /// List the payload refers to, if any.
    #[must_use]
    pub fn list_id(&self) -> Option<&str> {
        match self {
            Self::SortList { list_id, .. }
            | Self::Complete { list_id }
            | Self::ConfirmComplete { list_id }
            | Self::CancelComplete { list_id }
            | Self::Prev { list_id, .. }
            | Self::Next { list_id, .. }
            | Self::Page { list_id, .. }
            | Self::Share { list_id }
            | Self::Unsubscribe { list_id }
            | Self::Toggle { list_id, .. }
            | Self::Delete { list_id, .. }
            | Self::Label { list_id, .. } => Some(list_id),
            Self::DisabledPrev | Self::DisabledNext => None,
        }
    }
}

impl fmt::Display for ListCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SortList { list_id, page } => write!(f, "sort_list_{list_id}_{page}"),
            Self::Complete { list_id } => write!(f, "complete_{list_id}"),
            Self::ConfirmComplete { list_id } => write!(f, "confirm_complete_{list_id}"),
            Self::CancelComplete { list_id } => write!(f, "cancel_complete_{list_id}"),
            Self::Prev { list_id, page } => write!(f, "prev_{list_id}_{page}"),
            Self::Next { list_id, page } => write!(f, "next_{list_id}_{page}"),
            Self::Page { list_id, page } => write!(f, "page_{list_id}_{page}"),
            Self::DisabledPrev => f.write_str("disabled_prev"),
            Self::DisabledNext => f.write_str("disabled_next"),
            Self::Share { list_id } => write!(f, "share_{list_id}"),
            Self::Unsubscribe { list_id } => write!(f, "unsubscribe_{list_id}"),
            Self::Toggle {
                list_id,
                item_id,
                page,
            } => write!(f, "toggle_{list_id}_{item_id}_{page}"),
            Self::Delete {
                list_id,
                item_id,
                page,
            } => write!(f, "delete_{list_id}_{item_id}_{page}"),
            Self::Label {
                list_id,
                item_id,
                page,
            } => write!(f, "none_{list_id}_{item_id}_{page}"),
        }
    }
}

impl FromStr for ListCallback {
    type Err = CallbackParseError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let data = data.trim();
        if data.is_empty() {
            return Err(CallbackParseError::Empty);
        }
        match data {
            "disabled_prev" => return Ok(Self::DisabledPrev),
            "disabled_next" => return Ok(Self::DisabledNext),
            _ => {}
        }

        let (action, rest) = ["sort_list", "confirm_complete", "cancel_complete"]
            .into_iter()
            .find_map(|prefix| {
                data.strip_prefix(prefix)
                    .and_then(|rest| rest.strip_prefix('_'))
                    .map(|rest| (prefix, rest))
            })
            .or_else(|| data.split_once('_'))
            .ok_or_else(|| CallbackParseError::Unknown(data.to_string()))?;
        let args: Vec<&str> = rest.split('_').collect();
        if args.iter().any(|arg| arg.is_empty()) {
            return Err(CallbackParseError::Unknown(data.to_string()));
        }

        let callback = match (action, args.as_slice()) {
            ("sort_list", [list_id, page]) => Self::SortList {
                list_id: (*list_id).to_string(),
                page: parse_page(page)?,
            },
            ("complete", [list_id]) => Self::Complete {
                list_id: (*list_id).to_string(),
            },
            ("confirm_complete", [list_id]) => Self::ConfirmComplete {
                list_id: (*list_id).to_string(),
            },
            ("cancel_complete", [list_id]) => Self::CancelComplete {
                list_id: (*list_id).to_string(),
            },
            ("prev", [list_id, page]) => Self::Prev {
                list_id: (*list_id).to_string(),
                page: parse_page(page)?,
            },
            ("next", [list_id, page]) => Self::Next {
                list_id: (*list_id).to_string(),
                page: parse_page(page)?,
            },
            ("page", [list_id, page]) => Self::Page {
                list_id: (*list_id).to_string(),
                page: parse_page(page)?,
            },
            ("share", [list_id]) => Self::Share {
                list_id: (*list_id).to_string(),
            },
            ("unsubscribe", [list_id]) => Self::Unsubscribe {
                list_id: (*list_id).to_string(),
            },
            ("toggle", [list_id, item_id, page]) => Self::Toggle {
                list_id: (*list_id).to_string(),
                item_id: (*item_id).to_string(),
                page: parse_page(page)?,
            },
            ("delete", [list_id, item_id, page]) => Self::Delete {
                list_id: (*list_id).to_string(),
                item_id: (*item_id).to_string(),
                page: parse_page(page)?,
            },
            ("none", [list_id, item_id, page]) => Self::Label {
                list_id: (*list_id).to_string(),
                item_id: (*item_id).to_string(),
                page: parse_page(page)?,
            },
            _ => return Err(CallbackParseError::Unknown(data.to_string())),
        };
        Ok(callback)
    }
}

fn parse_page(raw: &str) -> Result<u32, CallbackParseError> {
    raw.parse()
        .map_err(|_| CallbackParseError::InvalidPage(raw.to_string()))
}
