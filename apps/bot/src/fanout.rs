//! Re-renders a list for the other members after someone changes it.

use std::sync::Arc;

use shopping_proto::ListRecord;
use teloxide::utils::html;
use tracing::{debug, warn};

use crate::{
    backend::ListBackend,
    presenter::{Banner, ListPresenter, RefreshRequest},
};

const UNNAMED_ACTOR: &str = "User";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListChange {
    Added(String),
    Deleted(String),
    Toggled(String),
    Unsubscribed,
}

impl ListChange {
    #[must_use]
    pub fn banner(&self, actor: Option<&str>) -> String {
        let actor = actor
            .filter(|name| !name.trim().is_empty())
            .map_or_else(|| UNNAMED_ACTOR.to_string(), html::escape);
        match self {
            Self::Added(item) => format!(
                "@{actor} <b>added</b> to the list: <i>{}</i>",
                html::escape(item)
            ),
            Self::Deleted(item) => format!(
                "@{actor} <b>deleted</b> from the list: <i>{}</i>",
                html::escape(item)
            ),
            Self::Toggled(item) => format!(
                "@{actor} <b>changed the status</b> of: <i>{}</i>",
                html::escape(item)
            ),
            Self::Unsubscribed => format!("@{actor} <b>unsubscribed</b> from the list."),
        }
    }
}

/// Members to re-render, in order. Item changes skip the actor. An
/// unsubscribe always reaches the owner first.
#[must_use]
pub fn recipients(list: &ListRecord, actor_id: i64, change: &ListChange) -> Vec<i64> {
    match change {
        ListChange::Unsubscribed => std::iter::once(list.owner_id)
            .chain(
                list.users
                    .iter()
                    .copied()
                    .filter(|user_id| *user_id != list.owner_id && *user_id != actor_id),
            )
            .collect(),
        _ => list
            .users
            .iter()
            .copied()
            .filter(|user_id| *user_id != actor_id)
            .collect(),
    }
}

#[derive(Clone)]
pub struct Fanout {
    backend: Arc<dyn ListBackend>,
    presenter: ListPresenter,
}

impl Fanout {
    pub fn new(backend: Arc<dyn ListBackend>, presenter: ListPresenter) -> Self {
        Self { backend, presenter }
    }

    /// Refreshes every recipient with the change banner, then stores the
    /// banner on the list. Returns how many members were refreshed.
    pub async fn notify(
        &self,
        list_id: &str,
        actor_id: i64,
        actor: Option<&str>,
        change: &ListChange,
    ) -> usize {
        let list = match self.backend.list(list_id).await {
            Ok(Some(list)) => list,
            Ok(None) => {
                debug!(list_id, "list vanished before fan-out");
                return 0;
            }
            Err(error) => {
                warn!(list_id, reason = %error, "failed to load list for fan-out");
                return 0;
            }
        };

        let banner = change.banner(actor);
        let mut refreshed = 0;
        for user_id in recipients(&list, actor_id, change) {
            let chat_id = match self.backend.user(user_id).await {
                Ok(Some(user)) => user.chat_id,
                Ok(None) => None,
                Err(error) => {
                    warn!(list_id, user_id, reason = %error, "failed to look up list member");
                    continue;
                }
            };
            let Some(chat_id) = chat_id else {
                debug!(list_id, user_id, "list member has no known chat");
                continue;
            };

            match self
                .presenter
                .refresh(RefreshRequest {
                    chat_id,
                    user_id,
                    list_id,
                    page: None,
                    banner: Banner::Explicit(&banner),
                })
                .await
            {
                Ok(Some(_)) => refreshed += 1,
                Ok(None) => {}
                Err(error) => {
                    warn!(list_id, user_id, reason = %error, "failed to refresh list member");
                }
            }
        }

        if let Err(error) = self.backend.set_notification(list_id, &banner).await {
            warn!(list_id, reason = %error, "failed to store list banner");
        }
        refreshed
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::{Context, Result};
    use shopping_proto::ListRecord;

    use super::{Fanout, ListChange, recipients};
    use crate::{
        backend::ListBackend,
        presenter::ListPresenter,
        sort_prefs::InMemorySortPreferences,
        testing::{RecordingTransport, ServiceBackend},
    };

    const OWNER: i64 = 1;
    const MEMBER: i64 = 2;
    const GUEST: i64 = 3;

    fn list(users: Vec<i64>) -> ListRecord {
        ListRecord {
            list_id: "aaaaaaaaaaaaaaaaaaaaaaaa".to_string(),
            owner_id: OWNER,
            users,
            items: Vec::new(),
            completed: false,
            last_notification_text: None,
        }
    }

    #[test]
    fn banners_name_the_actor_and_escape_items() {
        assert_eq!(
            ListChange::Added("Fish & Chips".to_string()).banner(Some("bob")),
            "@bob <b>added</b> to the list: <i>Fish &amp; Chips</i>"
        );
        assert_eq!(
            ListChange::Deleted("Milk".to_string()).banner(None),
            "@User <b>deleted</b> from the list: <i>Milk</i>"
        );
        assert_eq!(
            ListChange::Toggled("Milk".to_string()).banner(Some("")),
            "@User <b>changed the status</b> of: <i>Milk</i>"
        );
        assert_eq!(
            ListChange::Unsubscribed.banner(Some("bob")),
            "@bob <b>unsubscribed</b> from the list."
        );
    }

    #[test]
    fn item_changes_skip_the_actor() {
        let list = list(vec![OWNER, MEMBER, GUEST]);
        assert_eq!(
            recipients(&list, MEMBER, &ListChange::Added("x".to_string())),
            vec![OWNER, GUEST]
        );
        assert_eq!(
            recipients(&list, OWNER, &ListChange::Toggled("x".to_string())),
            vec![MEMBER, GUEST]
        );
    }

    #[test]
    fn unsubscribe_reaches_the_owner_first() {
        let after = list(vec![OWNER, GUEST]);
        assert_eq!(
            recipients(&after, MEMBER, &ListChange::Unsubscribed),
            vec![OWNER, GUEST]
        );
        let only_owner = list(vec![OWNER]);
        assert_eq!(
            recipients(&only_owner, MEMBER, &ListChange::Unsubscribed),
            vec![OWNER]
        );
    }

    #[tokio::test]
    async fn notify_refreshes_members_and_stores_the_banner() -> Result<()> {
        let backend = Arc::new(ServiceBackend::new());
        let transport = Arc::new(RecordingTransport::default());
        let presenter = ListPresenter::new(
            backend.clone(),
            transport.clone(),
            Arc::new(InMemorySortPreferences::default()),
        );
        let fanout = Fanout::new(backend.clone(), presenter);

        backend.record_user_action(OWNER, 100, Some("alice")).await?;
        backend.record_user_action(MEMBER, 200, Some("bob")).await?;
        let list_id = backend.create_list(OWNER).await?;
        backend.share_list(&list_id, MEMBER).await?;
        // A member who never talked to the bot has no chat to render into.
        backend.share_list(&list_id, GUEST).await?;
        backend.add_items(&list_id, &["Milk".to_string()]).await?;

        let refreshed = fanout
            .notify(&list_id, MEMBER, Some("bob"), &ListChange::Added("Milk".to_string()))
            .await;

        assert_eq!(refreshed, 1);
        let owner_texts = transport.sent_to(100).await;
        assert_eq!(owner_texts.len(), 1);
        assert!(owner_texts[0].contains("@bob <b>added</b> to the list: <i>Milk</i>"));
        assert!(transport.sent_to(200).await.is_empty());

        let stored = backend.list(&list_id).await?.context("list exists")?;
        assert_eq!(
            stored.last_notification_text.as_deref(),
            Some("@bob <b>added</b> to the list: <i>Milk</i>")
        );
        Ok(())
    }
}
