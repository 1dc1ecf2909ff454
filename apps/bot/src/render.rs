//! Pure list view computation: body text and inline keyboard for one viewer.

use shopping_proto::{ItemRecord, ListRecord};
use teloxide::utils::html;

use crate::callback::ListCallback;

pub const PAGE_SIZE: usize = 6;
pub const LABEL_MAX_CHARS: usize = 57;
pub const BODY_NAME_MAX_CHARS: usize = 200;
/// Telegram rejects longer message texts.
pub const MESSAGE_MAX_CHARS: usize = 4096;
/// Room kept after the item lines for closing markup and the completion prompt.
const BODY_TAIL_RESERVE: usize = 160;

const BOUGHT_MARKER: &str = "🟩";
const OPEN_MARKER: &str = "⬜️";

pub const EMPTY_LIST_HINT: &str = "Your list is empty for now. To add items, just send me a message with the item names.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub text: String,
    pub action: ListCallback,
}

impl Button {
    fn new(text: impl Into<String>, action: ListCallback) -> Self {
        Self {
            text: text.into(),
            action,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    /// Every button in row order.
    pub fn buttons(&self) -> impl Iterator<Item = &Button> {
        self.rows.iter().flatten()
    }
}

/// How the list owner is named in the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerName {
    Username(String),
    Unnamed(i64),
    Unknown,
}

impl OwnerName {
    fn display(&self) -> String {
        match self {
            Self::Username(username) => format!("@{}", html::escape(username)),
            Self::Unnamed(owner_id) => format!("owner ID: {owner_id}"),
            Self::Unknown => "<b>unknown</b> owner".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ViewInput<'a> {
    pub list: &'a ListRecord,
    pub viewer_id: i64,
    pub requested_page: u32,
    pub sorted: bool,
    pub owner: &'a OwnerName,
    pub banner: Option<&'a str>,
    pub skip_confirm: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListView {
    pub text: String,
    pub keyboard: Keyboard,
    pub page: u32,
    pub page_count: u32,
    pub confirming: bool,
}

#[must_use]
pub fn page_count(item_count: usize) -> u32 {
    if item_count == 0 {
        return 1;
    }
    u32::try_from(item_count.div_ceil(PAGE_SIZE)).unwrap_or(u32::MAX)
}

#[must_use]
pub fn clamp_page(requested: u32, page_count: u32) -> u32 {
    requested.clamp(1, page_count.max(1))
}

/// Case-insensitive by name when `sorted`; the sort is stable.
#[must_use]
pub fn ordered_items(items: &[ItemRecord], sorted: bool) -> Vec<&ItemRecord> {
    let mut ordered: Vec<&ItemRecord> = items.iter().collect();
    if sorted {
        ordered.sort_by_cached_key(|item| item.name.to_lowercase());
    }
    ordered
}

#[must_use]
pub fn truncate_chars(value: &str, max_chars: usize) -> String {
    match value.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &value[..cut]),
        None => value.to_string(),
    }
}

fn marker(item: &ItemRecord) -> &'static str {
    if item.bought { BOUGHT_MARKER } else { OPEN_MARKER }
}

#[must_use]
pub fn render_list_view(input: &ViewInput<'_>) -> ListView {
    let list = input.list;
    let items = ordered_items(&list.items, input.sorted);
    let page_count = page_count(items.len());
    let page = clamp_page(input.requested_page, page_count);
    let is_owner = input.viewer_id == list.owner_id;

    let mut text = String::new();
    if list.completed {
        text.push_str("[Completed] ");
    }
    text.push_str(&format!("List owner: {}\n", input.owner.display()));
    if let Some(banner) = input.banner.filter(|banner| !banner.trim().is_empty()) {
        text.push_str(banner);
        text.push('\n');
    }
    if items.is_empty() {
        text.push_str(EMPTY_LIST_HINT);
    } else {
        let lines: Vec<String> = items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                format!(
                    "{}. {} {}",
                    index + 1,
                    marker(item),
                    html::escape(&truncate_chars(&item.name, BODY_NAME_MAX_CHARS))
                )
            })
            .collect();
        text.push_str("<blockquote expandable>");
        push_lines_within_limit(&mut text, &lines);
        text.push_str("</blockquote>");
    }

    let confirming = !list.completed && list.all_bought() && is_owner && !input.skip_confirm;
    let keyboard = if confirming {
        text.push_str("\n\n<b>All items are checked</b>. Complete the list?");
        confirm_keyboard(&list.list_id)
    } else {
        list_keyboard(input, &items, page, page_count)
    };

    ListView {
        text,
        keyboard,
        page,
        page_count,
        confirming,
    }
}

/// Appends as many lines as fit the message limit, then a count of the rest.
fn push_lines_within_limit(text: &mut String, lines: &[String]) {
    let budget = MESSAGE_MAX_CHARS.saturating_sub(text.chars().count() + BODY_TAIL_RESERVE);
    let mut used = 0;
    let mut shown = 0;
    for line in lines {
        let cost = line.chars().count() + 1;
        if used + cost > budget {
            break;
        }
        if shown > 0 {
            text.push('\n');
        }
        text.push_str(line);
        used += cost;
        shown += 1;
    }
    if shown < lines.len() {
        text.push_str(&format!("\n... and {} more", lines.len() - shown));
    }
}

fn list_keyboard(
    input: &ViewInput<'_>,
    items: &[&ItemRecord],
    page: u32,
    page_count: u32,
) -> Keyboard {
    let list = input.list;
    let list_id = list.list_id.clone();
    let start = (page as usize - 1) * PAGE_SIZE;
    let mut rows = Vec::new();

    for (offset, item) in items.iter().skip(start).take(PAGE_SIZE).enumerate() {
        let number = start + offset + 1;
        let item_id = item.item_id.clone();
        rows.push(vec![
            Button::new(
                format!("{number}. {}", truncate_chars(&item.name, LABEL_MAX_CHARS)),
                ListCallback::Label {
                    list_id: list_id.clone(),
                    item_id: item_id.clone(),
                    page,
                },
            ),
            Button::new(
                marker(item),
                ListCallback::Toggle {
                    list_id: list_id.clone(),
                    item_id: item_id.clone(),
                    page,
                },
            ),
            Button::new(
                "🗑️",
                ListCallback::Delete {
                    list_id: list_id.clone(),
                    item_id,
                    page,
                },
            ),
        ]);
    }

    if page_count > 1 && !list.completed {
        let prev = if page > 1 {
            ListCallback::Prev {
                list_id: list_id.clone(),
                page,
            }
        } else {
            ListCallback::DisabledPrev
        };
        let next = if page < page_count {
            ListCallback::Next {
                list_id: list_id.clone(),
                page,
            }
        } else {
            ListCallback::DisabledNext
        };
        rows.push(vec![
            Button::new("⬅️", prev),
            Button::new(
                format!("{page}/{page_count}"),
                ListCallback::Page {
                    list_id: list_id.clone(),
                    page,
                },
            ),
            Button::new("➡️", next),
        ]);
    }

    if !list.completed && !items.is_empty() {
        let sort_label = if input.sorted { "Sort ✅" } else { "Sort ❌" };
        rows.push(vec![Button::new(
            sort_label,
            ListCallback::SortList {
                list_id: list_id.clone(),
                page,
            },
        )]);
        rows.push(vec![Button::new(
            "Share",
            ListCallback::Share {
                list_id: list_id.clone(),
            },
        )]);
    }
    if !list.completed && input.viewer_id != list.owner_id {
        rows.push(vec![Button::new(
            "Unsubscribe",
            ListCallback::Unsubscribe {
                list_id: list_id.clone(),
            },
        )]);
    }
    if !list.completed && !items.is_empty() && input.viewer_id == list.owner_id {
        rows.push(vec![Button::new(
            "Complete",
            ListCallback::Complete { list_id },
        )]);
    }

    Keyboard { rows }
}

#[must_use]
pub fn confirm_keyboard(list_id: &str) -> Keyboard {
    Keyboard {
        rows: vec![vec![
            Button::new(
                "Yes",
                ListCallback::ConfirmComplete {
                    list_id: list_id.to_string(),
                },
            ),
            Button::new(
                "No",
                ListCallback::CancelComplete {
                    list_id: list_id.to_string(),
                },
            ),
        ]],
    }
}

/// Summary sent to every member once a list is completed.
#[must_use]
pub fn completion_summary(items: &[ItemRecord]) -> String {
    let mut text = String::from("List <b>completed!</b>\n");
    if items.is_empty() {
        text.push_str("The list <b>was empty</b>");
        return text;
    }
    let lines: Vec<String> = items
        .iter()
        .map(|item| format!("{} {}", marker(item), html::escape(&item.name)))
        .collect();
    text.push_str(&lines.join("\n"));
    text
}
