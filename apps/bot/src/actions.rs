//! Chat flows, independent of the Telegram update types.

use std::sync::Arc;

use anyhow::Result;
use shopping_proto::{PreconditionReason, is_record_id};
use tracing::{debug, error, info, warn};

use crate::{
    backend::ListBackend,
    callback::ListCallback,
    fanout::{Fanout, ListChange},
    presenter::{Banner, ListPresenter, RefreshRequest},
    render::completion_summary,
    sort_prefs::SortPreferences,
    transport::ChatTransport,
};

pub const USERNAME_REQUIRED: &str =
    "Sorry, to use the bot please <b>make your username visible</b> in your Telegram settings.";

pub const WELCOME: &str = "Hi!\n\nI am a bot for <b>making lists.</b>\n\n\
To build a list, <b>send me the items:</b>\n\
- as <u>separate</u> messages\n\
- in <u>one message</u>, one item per line\n\
- <u>forward</u> messages from other chats\n\n\
<i>Only <b>one list</b> is active at a time (a list shared with you takes priority)</i>";

pub const ALREADY_MEMBER: &str = "You are <b>already added</b> to this list!";
pub const SUBSCRIBED_ELSEWHERE: &str = "You are <b>already in another list!</b>";
pub const JOINED: &str = "You <b>have been added</b> to the list!";
pub const JOIN_FAILED: &str = "<b>Could not add</b> you to the list.";
pub const LIST_ERROR: &str = "<b>Error</b> while working with lists.";
pub const ADD_FAILED: &str = "<b>Could not</b> add the items.";
pub const TEXT_ONLY: &str = "Only <b>text messages</b> are supported.";
pub const SOMETHING_WENT_WRONG: &str = "Something went wrong. Please try again.";

/// Who an inbound event came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub user_id: i64,
    pub chat_id: i64,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound<'a> {
    Text(&'a str),
    /// Photos, stickers, files and anything else without text.
    Unsupported,
}

pub struct BotActions {
    backend: Arc<dyn ListBackend>,
    transport: Arc<dyn ChatTransport>,
    sort: Arc<dyn SortPreferences>,
    presenter: ListPresenter,
    fanout: Fanout,
}

impl BotActions {
    pub fn new(
        backend: Arc<dyn ListBackend>,
        transport: Arc<dyn ChatTransport>,
        sort: Arc<dyn SortPreferences>,
    ) -> Self {
        let presenter = ListPresenter::new(backend.clone(), transport.clone(), sort.clone());
        let fanout = Fanout::new(backend.clone(), presenter.clone());
        Self {
            backend,
            transport,
            sort,
            presenter,
            fanout,
        }
    }

    /// `/start`, optionally carrying the id of a list shared via deep link.
    pub async fn start(&self, sender: &Sender, payload: Option<&str>) -> Result<()> {
        if !self.has_username(sender).await {
            return Ok(());
        }
        self.record_activity(sender).await;

        match payload.map(str::trim).filter(|payload| !payload.is_empty()) {
            Some(list_id) => self.join_shared_list(sender, list_id).await,
            None => self.open_active_list(sender).await,
        }
    }

    /// Any non-command message: every non-blank line becomes an item.
    pub async fn message(&self, sender: &Sender, message_id: i32, inbound: Inbound<'_>) -> Result<()> {
        if !self.has_username(sender).await {
            return Ok(());
        }
        self.record_activity(sender).await;

        let Inbound::Text(text) = inbound else {
            self.reply(sender.chat_id, TEXT_ONLY).await;
            self.delete(sender.chat_id, message_id).await;
            return Ok(());
        };

        let list_id = match self.text_target(sender.user_id).await {
            Ok(list_id) => list_id,
            Err(error) => {
                error!(user_id = sender.user_id, reason = %error, "failed to resolve active list");
                self.reply(sender.chat_id, LIST_ERROR).await;
                return Ok(());
            }
        };

        let names: Vec<String> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(ToString::to_string)
            .collect();
        if names.is_empty() {
            return Ok(());
        }

        match self.backend.add_items(&list_id, &names).await {
            Ok(added) => {
                info!(list_id = %list_id, user_id = sender.user_id, count = added.len(), "items added");
                if let Some(last) = added.last().or_else(|| names.last()) {
                    self.fanout
                        .notify(
                            &list_id,
                            sender.user_id,
                            sender.username.as_deref(),
                            &ListChange::Added(last.clone()),
                        )
                        .await;
                }
            }
            Err(error) => {
                error!(list_id = %list_id, user_id = sender.user_id, reason = %error, "failed to add items");
                self.reply(sender.chat_id, ADD_FAILED).await;
            }
        }

        if !self.show(sender, &list_id, None, Banner::Hidden).await {
            self.reply(sender.chat_id, SOMETHING_WENT_WRONG).await;
        }
        self.delete(sender.chat_id, message_id).await;
        Ok(())
    }

    /// An inline button press. `message_id` is the message that carried it.
    pub async fn callback(
        &self,
        sender: &Sender,
        callback_id: &str,
        message_id: Option<i32>,
        data: &str,
    ) -> Result<()> {
        self.record_activity(sender).await;

        let action = match data.parse::<ListCallback>() {
            Ok(action) => action,
            Err(error) => {
                warn!(data, user_id = sender.user_id, reason = %error, "unrecognized callback payload");
                self.answer(callback_id, None, false).await;
                return Ok(());
            }
        };
        debug!(user_id = sender.user_id, action = %action, "callback received");

        match action {
            ListCallback::SortList { list_id, page } => {
                let sorted = self.sort.toggle(&list_id).await;
                if self.show(sender, &list_id, Some(page), Banner::Stored).await {
                    let text = if sorted {
                        "List sorted alphabetically"
                    } else {
                        "Sorting turned off"
                    };
                    self.answer(callback_id, Some(text), false).await;
                } else {
                    self.answer_failure(callback_id).await;
                }
            }
            ListCallback::Complete { list_id } | ListCallback::ConfirmComplete { list_id } => {
                self.complete(sender, callback_id, &list_id).await;
            }
            ListCallback::CancelComplete { list_id } => {
                match self
                    .backend
                    .set_skip_confirm(sender.user_id, &list_id, true)
                    .await
                {
                    Ok(()) => {
                        if self.show(sender, &list_id, None, Banner::Stored).await {
                            self.answer(callback_id, Some("The list stays active."), false)
                                .await;
                        } else {
                            self.answer_failure(callback_id).await;
                        }
                    }
                    Err(error) => {
                        error!(list_id = %list_id, user_id = sender.user_id, reason = %error, "failed to dismiss completion prompt");
                        self.answer(callback_id, Some("Could not cancel."), false)
                            .await;
                    }
                }
            }
            ListCallback::Prev { list_id, page } => {
                self.turn_page(sender, callback_id, &list_id, page.saturating_sub(1).max(1))
                    .await;
            }
            ListCallback::Next { list_id, page } => {
                self.turn_page(sender, callback_id, &list_id, page.saturating_add(1))
                    .await;
            }
            ListCallback::Page { page, .. } => {
                self.answer(callback_id, Some(&format!("You are on page {page}")), false)
                    .await;
            }
            ListCallback::DisabledPrev => {
                self.answer(callback_id, Some("You are on the first page"), false)
                    .await;
            }
            ListCallback::DisabledNext => {
                self.answer(callback_id, Some("You are on the last page"), false)
                    .await;
            }
            ListCallback::Share { list_id } => match self.transport.bot_username().await {
                Ok(bot) => {
                    self.reply(
                        sender.chat_id,
                        &format!("Share this link: t.me/{bot}?start={list_id}"),
                    )
                    .await;
                    self.answer(callback_id, None, false).await;
                }
                Err(error) => {
                    error!(list_id = %list_id, reason = %error, "failed to resolve bot username");
                    self.answer(callback_id, Some("Could not build the share link."), false)
                        .await;
                }
            },
            ListCallback::Unsubscribe { list_id } => {
                self.unsubscribe(sender, callback_id, message_id, &list_id)
                    .await;
            }
            ListCallback::Toggle {
                list_id,
                item_id,
                page,
            } => {
                let Some(name) = self.item_name(&list_id, &item_id).await else {
                    self.answer(callback_id, None, false).await;
                    return Ok(());
                };
                let alert = match self.backend.toggle_item(&list_id, &item_id).await {
                    Ok(bought) => {
                        self.reset_skip_confirm(sender.user_id, &list_id).await;
                        self.fanout
                            .notify(
                                &list_id,
                                sender.user_id,
                                sender.username.as_deref(),
                                &ListChange::Toggled(name.clone()),
                            )
                            .await;
                        let status = if bought { "done" } else { "not done" };
                        format!("Status of '{name}' changed to {status}")
                    }
                    Err(error) => {
                        error!(list_id = %list_id, item_id = %item_id, reason = %error, "failed to toggle item");
                        "Could not change the status.".to_string()
                    }
                };
                if self.show(sender, &list_id, Some(page), Banner::Hidden).await {
                    self.answer(callback_id, Some(&alert), false).await;
                } else {
                    self.answer_failure(callback_id).await;
                }
            }
            ListCallback::Delete {
                list_id,
                item_id,
                page,
            } => {
                let Some(name) = self.item_name(&list_id, &item_id).await else {
                    self.answer(callback_id, None, false).await;
                    return Ok(());
                };
                let alert = match self.backend.delete_item(&list_id, &item_id).await {
                    Ok(_) => {
                        self.reset_skip_confirm(sender.user_id, &list_id).await;
                        self.fanout
                            .notify(
                                &list_id,
                                sender.user_id,
                                sender.username.as_deref(),
                                &ListChange::Deleted(name.clone()),
                            )
                            .await;
                        format!("'{name}' removed from the list")
                    }
                    Err(error) => {
                        error!(list_id = %list_id, item_id = %item_id, reason = %error, "failed to delete item");
                        "Could not delete the item.".to_string()
                    }
                };
                if self.show(sender, &list_id, Some(page), Banner::Hidden).await {
                    self.answer(callback_id, Some(&alert), false).await;
                } else {
                    self.answer_failure(callback_id).await;
                }
            }
            ListCallback::Label {
                list_id, item_id, ..
            } => {
                let text = self
                    .item_name(&list_id, &item_id)
                    .await
                    .map(|name| format!("'{name}' - choose an action"));
                self.answer(callback_id, text.as_deref(), false).await;
            }
        }
        Ok(())
    }

    async fn turn_page(&self, sender: &Sender, callback_id: &str, list_id: &str, page: u32) {
        if self.show(sender, list_id, Some(page), Banner::Stored).await {
            self.answer(callback_id, Some(&format!("You are on page {page}")), false)
                .await;
        } else {
            self.answer_failure(callback_id).await;
        }
    }

    async fn has_username(&self, sender: &Sender) -> bool {
        if sender
            .username
            .as_deref()
            .is_some_and(|name| !name.trim().is_empty())
        {
            return true;
        }
        debug!(user_id = sender.user_id, "sender has no visible username");
        self.reply(sender.chat_id, USERNAME_REQUIRED).await;
        false
    }

    async fn record_activity(&self, sender: &Sender) {
        if let Err(error) = self
            .backend
            .record_user_action(sender.user_id, sender.chat_id, sender.username.as_deref())
            .await
        {
            warn!(user_id = sender.user_id, reason = %error, "failed to record user activity");
        }
    }

    async fn join_shared_list(&self, sender: &Sender, list_id: &str) -> Result<()> {
        if !is_record_id(list_id) {
            debug!(user_id = sender.user_id, "start payload is not a list id");
            self.reply(sender.chat_id, JOIN_FAILED).await;
            return Ok(());
        }
        let list = match self.backend.list(list_id).await {
            Ok(Some(list)) => list,
            Ok(None) => {
                debug!(list_id, user_id = sender.user_id, "shared list does not exist");
                self.reply(sender.chat_id, JOIN_FAILED).await;
                return Ok(());
            }
            Err(error) => {
                error!(list_id, user_id = sender.user_id, reason = %error, "failed to load shared list");
                self.reply(sender.chat_id, JOIN_FAILED).await;
                return Ok(());
            }
        };
        if list.is_member(sender.user_id) {
            self.reply(sender.chat_id, ALREADY_MEMBER).await;
            return Ok(());
        }

        match self.backend.share_list(list_id, sender.user_id).await {
            Ok(()) => {
                info!(list_id, user_id = sender.user_id, "user joined shared list");
                self.reply(sender.chat_id, JOINED).await;
                if !self.show(sender, list_id, None, Banner::Stored).await {
                    self.reply(sender.chat_id, SOMETHING_WENT_WRONG).await;
                }
                Ok(())
            }
            Err(error) => {
                let text = match error.reason_code() {
                    Some(PreconditionReason::AlreadyMember) => ALREADY_MEMBER,
                    Some(PreconditionReason::SubscribedElsewhere) => SUBSCRIBED_ELSEWHERE,
                    _ => {
                        warn!(list_id, user_id = sender.user_id, reason = %error, "failed to join shared list");
                        JOIN_FAILED
                    }
                };
                self.reply(sender.chat_id, text).await;
                Ok(())
            }
        }
    }

    async fn open_active_list(&self, sender: &Sender) -> Result<()> {
        let list_id = match self.start_target(sender.user_id).await {
            Ok(list_id) => list_id,
            Err(error) => {
                error!(user_id = sender.user_id, reason = %error, "failed to resolve active list");
                self.reply(sender.chat_id, LIST_ERROR).await;
                return Ok(());
            }
        };

        match self.backend.list(&list_id).await {
            Ok(Some(list)) if list.items.is_empty() => self.reply(sender.chat_id, WELCOME).await,
            Ok(_) => {}
            Err(error) => warn!(list_id = %list_id, reason = %error, "failed to check whether list is empty"),
        }

        self.forget_rendered(sender, &list_id).await;
        if !self.show(sender, &list_id, None, Banner::Stored).await {
            self.reply(sender.chat_id, SOMETHING_WENT_WRONG).await;
        }
        Ok(())
    }

    /// A list someone shared with the user wins over the user's own.
    async fn start_target(&self, user_id: i64) -> Result<String> {
        let lists = self.backend.user_lists(user_id).await?;
        if let Some(shared) = lists
            .iter()
            .find(|list| list.owner_id != user_id && list.is_member(user_id))
        {
            return Ok(shared.list_id.clone());
        }
        self.own_open_list(user_id).await
    }

    async fn text_target(&self, user_id: i64) -> Result<String> {
        match self.backend.last_subscribed_list(user_id).await? {
            Some(list_id) => Ok(list_id),
            None => self.own_open_list(user_id).await,
        }
    }

    async fn own_open_list(&self, user_id: i64) -> Result<String> {
        let lists = self.backend.user_lists(user_id).await?;
        if let Some(open) = lists
            .iter()
            .find(|list| list.owner_id == user_id && !list.completed)
        {
            return Ok(open.list_id.clone());
        }
        let list_id = self.backend.create_list(user_id).await?;
        info!(list_id = %list_id, user_id, "created list for user");
        Ok(list_id)
    }

    /// Deletes every rendered message of the list in the sender's chat.
    async fn forget_rendered(&self, sender: &Sender, list_id: &str) {
        let history = match self.backend.last_messages(sender.user_id, list_id).await {
            Ok(history) => history,
            Err(error) => {
                warn!(list_id, user_id = sender.user_id, reason = %error, "failed to load rendered messages");
                return;
            }
        };
        for message_id in history {
            self.delete(sender.chat_id, message_id).await;
            if let Err(error) = self
                .backend
                .remove_last_message(sender.user_id, list_id, message_id)
                .await
            {
                warn!(list_id, message_id, reason = %error, "failed to forget rendered message");
            }
        }
    }

    async fn complete(&self, sender: &Sender, callback_id: &str, list_id: &str) {
        let list = match self.backend.list(list_id).await {
            Ok(Some(list)) => list,
            Ok(None) => {
                self.answer(callback_id, Some("The list no longer exists."), false)
                    .await;
                return;
            }
            Err(error) => {
                error!(list_id, reason = %error, "failed to load list for completion");
                self.answer(callback_id, Some("Could not complete the list."), false)
                    .await;
                return;
            }
        };
        if list.owner_id != sender.user_id {
            self.answer(callback_id, Some("You are not the owner of the list."), false)
                .await;
            return;
        }

        let snapshot = match self.backend.complete_list(list_id).await {
            Ok(snapshot) => snapshot,
            Err(error) => {
                error!(list_id, reason = %error, "failed to complete list");
                self.answer(callback_id, Some("Could not complete the list."), false)
                    .await;
                return;
            }
        };

        let summary = completion_summary(&snapshot.items);
        for user_id in &snapshot.users {
            let chat_id = match self.backend.user(*user_id).await {
                Ok(Some(user)) => user.chat_id,
                Ok(None) => None,
                Err(error) => {
                    warn!(list_id, user_id, reason = %error, "failed to look up list member");
                    None
                }
            };
            let Some(chat_id) = chat_id else {
                warn!(list_id, user_id, "no chat known for list member");
                continue;
            };
            for message_id in snapshot
                .last_message_ids_for_users
                .get(user_id)
                .into_iter()
                .flatten()
            {
                self.delete(chat_id, *message_id).await;
            }
            if let Err(error) = self.transport.send_html(chat_id, &summary, None).await {
                warn!(list_id, user_id, reason = %error, "failed to send completion summary");
            }
        }

        self.sort.forget(list_id).await;
        info!(list_id, members = snapshot.users.len(), "list completed");
        self.answer(callback_id, Some("List completed!"), false)
            .await;
    }

    async fn unsubscribe(
        &self,
        sender: &Sender,
        callback_id: &str,
        message_id: Option<i32>,
        list_id: &str,
    ) {
        if let Err(error) = self.backend.unsubscribe(list_id, sender.user_id).await {
            warn!(list_id, user_id = sender.user_id, reason = %error, "failed to unsubscribe");
            self.answer(callback_id, Some("Could not unsubscribe."), true)
                .await;
            return;
        }

        self.answer(callback_id, Some("You have unsubscribed from the list."), true)
            .await;
        if let Some(message_id) = message_id {
            self.delete(sender.chat_id, message_id).await;
        }
        self.fanout
            .notify(
                list_id,
                sender.user_id,
                sender.username.as_deref(),
                &ListChange::Unsubscribed,
            )
            .await;
    }

    async fn item_name(&self, list_id: &str, item_id: &str) -> Option<String> {
        match self.backend.list(list_id).await {
            Ok(list) => list
                .as_ref()
                .and_then(|list| list.item(item_id))
                .map(|item| item.name.clone()),
            Err(error) => {
                warn!(list_id, item_id, reason = %error, "failed to load list items");
                None
            }
        }
    }

    async fn reset_skip_confirm(&self, user_id: i64, list_id: &str) {
        if let Err(error) = self.backend.clear_skip_confirm(user_id, list_id).await {
            warn!(list_id, user_id, reason = %error, "failed to reset completion prompt");
        }
    }

    /// Refreshes the sender's view of the list; `false` when it could not be shown.
    async fn show(
        &self,
        sender: &Sender,
        list_id: &str,
        page: Option<u32>,
        banner: Banner<'_>,
    ) -> bool {
        let request = RefreshRequest {
            chat_id: sender.chat_id,
            user_id: sender.user_id,
            list_id,
            page,
            banner,
        };
        match self.presenter.refresh(request).await {
            Ok(Some(_)) => true,
            Ok(None) => {
                debug!(list_id, user_id = sender.user_id, "list to show no longer exists");
                true
            }
            Err(error) => {
                error!(list_id, user_id = sender.user_id, reason = %error, "failed to show list");
                false
            }
        }
    }

    async fn reply(&self, chat_id: i64, text: &str) {
        if let Err(error) = self.transport.send_html(chat_id, text, None).await {
            warn!(chat_id, reason = %error, "failed to send reply");
        }
    }

    async fn delete(&self, chat_id: i64, message_id: i32) {
        if let Err(error) = self.transport.delete_message(chat_id, message_id).await {
            debug!(chat_id, message_id, reason = %error, "message was not deleted");
        }
    }

    async fn answer_failure(&self, callback_id: &str) {
        self.answer(callback_id, Some(SOMETHING_WENT_WRONG), true)
            .await;
    }

    async fn answer(&self, callback_id: &str, text: Option<&str>, show_alert: bool) {
        if let Err(error) = self
            .transport
            .answer_callback(callback_id, text, show_alert)
            .await
        {
            warn!(callback_id, reason = %error, "failed to answer callback");
        }
    }
}

#[cfg(test)]
mod tests;
