use std::sync::Arc;

use anyhow::{Context, Result};
use shopping_proto::ListRecord;

use super::{
    ALREADY_MEMBER, BotActions, Inbound, JOIN_FAILED, JOINED, SOMETHING_WENT_WRONG,
    SUBSCRIBED_ELSEWHERE, Sender, TEXT_ONLY, USERNAME_REQUIRED, WELCOME,
};
use crate::{
    backend::ListBackend,
    callback::ListCallback,
    render::completion_summary,
    sort_prefs::InMemorySortPreferences,
    testing::{BOT_USERNAME, RecordingTransport, ServiceBackend},
};

struct Harness {
    backend: Arc<ServiceBackend>,
    transport: Arc<RecordingTransport>,
    actions: BotActions,
}

fn harness() -> Harness {
    let backend = Arc::new(ServiceBackend::new());
    let transport = Arc::new(RecordingTransport::default());
    let actions = BotActions::new(
        backend.clone(),
        transport.clone(),
        Arc::new(InMemorySortPreferences::default()),
    );
    Harness {
        backend,
        transport,
        actions,
    }
}

fn sender(user_id: i64, username: &str) -> Sender {
    Sender {
        user_id,
        chat_id: user_id + 100,
        username: Some(username.to_string()),
    }
}

fn alice() -> Sender {
    sender(1, "alice")
}

fn bob() -> Sender {
    sender(2, "bob")
}

impl Harness {
    async fn own_list(&self, user: &Sender) -> Result<ListRecord> {
        self.backend
            .user_lists(user.user_id)
            .await?
            .into_iter()
            .find(|list| list.owner_id == user.user_id)
            .context("user owns a list")
    }

    async fn list(&self, list_id: &str) -> Result<ListRecord> {
        self.backend.list(list_id).await?.context("list exists")
    }

    async fn rendered(&self, user: &Sender, list_id: &str) -> Result<i32> {
        self.backend
            .last_messages(user.user_id, list_id)
            .await?
            .first()
            .copied()
            .context("list is rendered for user")
    }

    async fn rendered_text(&self, user: &Sender, list_id: &str) -> Result<String> {
        let message_id = self.rendered(user, list_id).await?;
        self.transport
            .text_of(message_id)
            .await
            .context("rendered message is live")
    }

    async fn type_text(&self, user: &Sender, text: &str) -> Result<i32> {
        let message_id = self.transport.incoming(user.chat_id, text).await;
        self.actions
            .message(user, message_id, Inbound::Text(text))
            .await?;
        Ok(message_id)
    }

    async fn press(&self, user: &Sender, action: &ListCallback) -> Result<()> {
        let message_id = match action.list_id() {
            Some(list_id) => self
                .backend
                .last_messages(user.user_id, list_id)
                .await?
                .first()
                .copied(),
            None => None,
        };
        self.actions
            .callback(user, "cb", message_id, &action.to_string())
            .await
    }

    async fn last_answer(&self) -> Option<(Option<String>, bool)> {
        self.transport.answers().await.pop()
    }
}

#[tokio::test]
async fn start_creates_a_list_and_welcomes_the_user() -> Result<()> {
    let h = harness();
    h.actions.start(&alice(), None).await?;

    let list = h.own_list(&alice()).await?;
    let sent = h.transport.sent_to(alice().chat_id).await;
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0], WELCOME);
    assert!(sent[1].starts_with("List owner: @alice\n"));
    assert_eq!(h.backend.last_messages(1, &list.list_id).await?.len(), 1);

    let user = h.backend.user(1).await?.context("user recorded")?;
    assert_eq!(user.chat_id, Some(alice().chat_id));
    assert_eq!(user.username.as_deref(), Some("alice"));
    Ok(())
}

#[tokio::test]
async fn repeated_start_replaces_the_rendered_message() -> Result<()> {
    let h = harness();
    h.actions.start(&alice(), None).await?;
    let list = h.own_list(&alice()).await?;
    let first = h.rendered(&alice(), &list.list_id).await?;

    h.actions.start(&alice(), None).await?;

    let second = h.rendered(&alice(), &list.list_id).await?;
    assert_ne!(first, second);
    assert!(!h.transport.live_in(alice().chat_id).await.contains(&first));
    assert_eq!(h.backend.last_messages(1, &list.list_id).await?, vec![second]);
    assert_eq!(h.backend.user_lists(1).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn hidden_username_is_asked_for_and_nothing_is_recorded() -> Result<()> {
    let h = harness();
    let anonymous = Sender {
        user_id: 9,
        chat_id: 109,
        username: None,
    };

    h.actions.start(&anonymous, None).await?;

    assert_eq!(h.transport.sent_to(109).await, vec![USERNAME_REQUIRED.to_string()]);
    assert!(h.backend.user(9).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn text_lines_become_items_and_the_message_is_removed() -> Result<()> {
    let h = harness();
    h.actions.start(&alice(), None).await?;

    let typed = h.type_text(&alice(), "Milk\n   \n Bread \n").await?;

    let list = h.own_list(&alice()).await?;
    let names: Vec<&str> = list.items.iter().map(|item| item.name.as_str()).collect();
    assert_eq!(names, vec!["Milk", "Bread"]);
    assert!(!h.transport.live_in(alice().chat_id).await.contains(&typed));

    let text = h.rendered_text(&alice(), &list.list_id).await?;
    assert!(text.contains("1. ⬜️ Milk\n2. ⬜️ Bread"));
    assert!(!text.contains("<b>added</b>"));
    assert_eq!(
        list.last_notification_text.as_deref(),
        Some("@alice <b>added</b> to the list: <i>Bread</i>")
    );
    Ok(())
}

#[tokio::test]
async fn unsupported_content_is_rejected_and_deleted() -> Result<()> {
    let h = harness();
    let photo = h.transport.incoming(alice().chat_id, "").await;

    h.actions
        .message(&alice(), photo, Inbound::Unsupported)
        .await?;

    assert_eq!(h.transport.sent_to(alice().chat_id).await, vec![TEXT_ONLY.to_string()]);
    assert!(!h.transport.live_in(alice().chat_id).await.contains(&photo));
    Ok(())
}

#[tokio::test]
async fn deep_link_joins_the_list_once() -> Result<()> {
    let h = harness();
    h.actions.start(&alice(), None).await?;
    let list = h.own_list(&alice()).await?;

    h.actions.start(&bob(), Some(&list.list_id)).await?;
    let sent = h.transport.sent_to(bob().chat_id).await;
    assert_eq!(sent[0], JOINED);
    assert!(sent[1].starts_with("List owner: @alice\n"));
    assert_eq!(h.list(&list.list_id).await?.users, vec![1, 2]);

    h.actions.start(&bob(), Some(&list.list_id)).await?;
    let sent = h.transport.sent_to(bob().chat_id).await;
    assert_eq!(sent.last().map(String::as_str), Some(ALREADY_MEMBER));

    // A plain /start now opens the shared list instead of creating one.
    h.actions.start(&bob(), None).await?;
    assert!(h.backend.user_lists(2).await?.iter().all(|l| l.list_id == list.list_id));
    Ok(())
}

#[tokio::test]
async fn deep_link_with_a_malformed_id_is_refused() -> Result<()> {
    let h = harness();
    h.actions.start(&alice(), None).await?;

    for payload in ["../users/1/", "abc?user_id=2", "0192F3A4B5C6D7E8F9A0B1C2"] {
        h.actions.start(&bob(), Some(payload)).await?;
    }

    let sent = h.transport.sent_to(bob().chat_id).await;
    assert_eq!(sent, vec![JOIN_FAILED.to_string(); 3]);
    assert!(h.backend.user_lists(bob().user_id).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn deep_link_is_refused_while_subscribed_elsewhere() -> Result<()> {
    let h = harness();
    let carol = sender(3, "carol");
    h.actions.start(&alice(), None).await?;
    h.actions.start(&carol, None).await?;
    let alices = h.own_list(&alice()).await?;
    let carols = h.own_list(&carol).await?;

    h.actions.start(&bob(), Some(&alices.list_id)).await?;
    h.actions.start(&bob(), Some(&carols.list_id)).await?;

    let sent = h.transport.sent_to(bob().chat_id).await;
    assert_eq!(sent.last().map(String::as_str), Some(SUBSCRIBED_ELSEWHERE));
    assert_eq!(h.list(&carols.list_id).await?.users, vec![3]);
    Ok(())
}

#[tokio::test]
async fn shared_member_text_goes_to_the_shared_list_and_notifies_owner() -> Result<()> {
    let h = harness();
    h.actions.start(&alice(), None).await?;
    let list = h.own_list(&alice()).await?;
    h.actions.start(&bob(), Some(&list.list_id)).await?;

    h.type_text(&bob(), "Eggs").await?;

    assert_eq!(h.list(&list.list_id).await?.items.len(), 1);
    let owner_view = h.rendered_text(&alice(), &list.list_id).await?;
    assert!(owner_view.contains("@bob <b>added</b> to the list: <i>Eggs</i>"));
    let bob_view = h.rendered_text(&bob(), &list.list_id).await?;
    assert!(!bob_view.contains("<b>added</b>"));
    Ok(())
}

#[tokio::test]
async fn toggle_updates_item_and_fans_out() -> Result<()> {
    let h = harness();
    h.actions.start(&alice(), None).await?;
    h.type_text(&alice(), "Milk\nBread").await?;
    let list = h.own_list(&alice()).await?;
    h.actions.start(&bob(), Some(&list.list_id)).await?;
    let milk = list.items[0].item_id.clone();

    h.press(
        &bob(),
        &ListCallback::Toggle {
            list_id: list.list_id.clone(),
            item_id: milk.clone(),
            page: 1,
        },
    )
    .await?;

    let updated = h.list(&list.list_id).await?;
    assert!(updated.item(&milk).context("milk exists")?.bought);
    assert_eq!(
        h.last_answer().await,
        Some((Some("Status of 'Milk' changed to done".to_string()), false))
    );
    let owner_view = h.rendered_text(&alice(), &list.list_id).await?;
    assert!(owner_view.contains("@bob <b>changed the status</b> of: <i>Milk</i>"));
    assert!(owner_view.contains("1. 🟩 Milk"));
    Ok(())
}

#[tokio::test]
async fn owner_is_prompted_once_everything_is_bought() -> Result<()> {
    let h = harness();
    h.actions.start(&alice(), None).await?;
    h.type_text(&alice(), "Milk").await?;
    let list = h.own_list(&alice()).await?;
    let toggle = ListCallback::Toggle {
        list_id: list.list_id.clone(),
        item_id: list.items[0].item_id.clone(),
        page: 1,
    };

    h.press(&alice(), &toggle).await?;
    let prompt = h.rendered_text(&alice(), &list.list_id).await?;
    assert!(prompt.ends_with("<b>All items are checked</b>. Complete the list?"));

    h.press(
        &alice(),
        &ListCallback::CancelComplete {
            list_id: list.list_id.clone(),
        },
    )
    .await?;
    assert!(h.backend.skip_confirm(1, &list.list_id).await?);
    assert_eq!(
        h.last_answer().await,
        Some((Some("The list stays active.".to_string()), false))
    );
    let dismissed = h.rendered_text(&alice(), &list.list_id).await?;
    assert!(!dismissed.contains("Complete the list?"));

    // Any item change brings the prompt back.
    h.press(&alice(), &toggle).await?;
    assert!(!h.backend.skip_confirm(1, &list.list_id).await?);
    Ok(())
}

#[tokio::test]
async fn delete_removes_the_item() -> Result<()> {
    let h = harness();
    h.actions.start(&alice(), None).await?;
    h.type_text(&alice(), "Milk\nBread").await?;
    let list = h.own_list(&alice()).await?;

    h.press(
        &alice(),
        &ListCallback::Delete {
            list_id: list.list_id.clone(),
            item_id: list.items[0].item_id.clone(),
            page: 1,
        },
    )
    .await?;

    let names: Vec<String> = h
        .list(&list.list_id)
        .await?
        .items
        .into_iter()
        .map(|item| item.name)
        .collect();
    assert_eq!(names, vec!["Bread".to_string()]);
    assert_eq!(
        h.last_answer().await,
        Some((Some("'Milk' removed from the list".to_string()), false))
    );
    Ok(())
}

#[tokio::test]
async fn label_and_missing_items_are_answered() -> Result<()> {
    let h = harness();
    h.actions.start(&alice(), None).await?;
    h.type_text(&alice(), "Milk").await?;
    let list = h.own_list(&alice()).await?;

    h.press(
        &alice(),
        &ListCallback::Label {
            list_id: list.list_id.clone(),
            item_id: list.items[0].item_id.clone(),
            page: 1,
        },
    )
    .await?;
    assert_eq!(
        h.last_answer().await,
        Some((Some("'Milk' - choose an action".to_string()), false))
    );

    h.press(
        &alice(),
        &ListCallback::Toggle {
            list_id: list.list_id.clone(),
            item_id: "ffffffffffffffffffffffff".to_string(),
            page: 1,
        },
    )
    .await?;
    assert_eq!(h.last_answer().await, Some((None, false)));
    Ok(())
}

#[tokio::test]
async fn navigation_moves_between_pages() -> Result<()> {
    let h = harness();
    h.actions.start(&alice(), None).await?;
    h.type_text(&alice(), "1\n2\n3\n4\n5\n6\n7").await?;
    let list = h.own_list(&alice()).await?;

    h.press(
        &alice(),
        &ListCallback::Next {
            list_id: list.list_id.clone(),
            page: 1,
        },
    )
    .await?;
    assert_eq!(h.backend.current_page(1, &list.list_id).await?, 2);
    assert_eq!(
        h.last_answer().await,
        Some((Some("You are on page 2".to_string()), false))
    );

    h.press(
        &alice(),
        &ListCallback::Prev {
            list_id: list.list_id.clone(),
            page: 2,
        },
    )
    .await?;
    assert_eq!(h.backend.current_page(1, &list.list_id).await?, 1);

    h.press(&alice(), &ListCallback::DisabledNext).await?;
    assert_eq!(
        h.last_answer().await,
        Some((Some("You are on the last page".to_string()), false))
    );
    Ok(())
}

#[tokio::test]
async fn sort_toggle_is_shared_by_the_list() -> Result<()> {
    let h = harness();
    h.actions.start(&alice(), None).await?;
    h.type_text(&alice(), "banana\nApple").await?;
    let list = h.own_list(&alice()).await?;

    h.press(
        &alice(),
        &ListCallback::SortList {
            list_id: list.list_id.clone(),
            page: 1,
        },
    )
    .await?;

    let text = h.rendered_text(&alice(), &list.list_id).await?;
    assert!(text.contains("1. ⬜️ Apple\n2. ⬜️ banana"));
    assert_eq!(
        h.last_answer().await,
        Some((Some("List sorted alphabetically".to_string()), false))
    );
    Ok(())
}

#[tokio::test]
async fn share_sends_a_deep_link() -> Result<()> {
    let h = harness();
    h.actions.start(&alice(), None).await?;
    let list = h.own_list(&alice()).await?;

    h.press(
        &alice(),
        &ListCallback::Share {
            list_id: list.list_id.clone(),
        },
    )
    .await?;

    let sent = h.transport.sent_to(alice().chat_id).await;
    assert_eq!(
        sent.last().map(String::as_str),
        Some(format!("Share this link: t.me/{BOT_USERNAME}?start={}", list.list_id).as_str())
    );
    Ok(())
}

#[tokio::test]
async fn unsubscribe_notifies_the_owner() -> Result<()> {
    let h = harness();
    h.actions.start(&alice(), None).await?;
    let list = h.own_list(&alice()).await?;
    h.actions.start(&bob(), Some(&list.list_id)).await?;
    let bob_message = h.rendered(&bob(), &list.list_id).await?;

    h.press(
        &bob(),
        &ListCallback::Unsubscribe {
            list_id: list.list_id.clone(),
        },
    )
    .await?;

    assert_eq!(
        h.last_answer().await,
        Some((Some("You have unsubscribed from the list.".to_string()), true))
    );
    assert!(!h.transport.live_in(bob().chat_id).await.contains(&bob_message));
    assert_eq!(h.list(&list.list_id).await?.users, vec![1]);
    let owner_view = h.rendered_text(&alice(), &list.list_id).await?;
    assert!(owner_view.contains("@bob <b>unsubscribed</b> from the list."));
    Ok(())
}

#[tokio::test]
async fn owner_cannot_unsubscribe() -> Result<()> {
    let h = harness();
    h.actions.start(&alice(), None).await?;
    let list = h.own_list(&alice()).await?;

    h.press(
        &alice(),
        &ListCallback::Unsubscribe {
            list_id: list.list_id.clone(),
        },
    )
    .await?;

    assert_eq!(
        h.last_answer().await,
        Some((Some("Could not unsubscribe.".to_string()), true))
    );
    assert_eq!(h.list(&list.list_id).await?.users, vec![1]);
    Ok(())
}

#[tokio::test]
async fn only_the_owner_completes_and_everyone_gets_the_summary() -> Result<()> {
    let h = harness();
    h.actions.start(&alice(), None).await?;
    h.type_text(&alice(), "Milk").await?;
    let list = h.own_list(&alice()).await?;
    h.actions.start(&bob(), Some(&list.list_id)).await?;
    let complete = ListCallback::Complete {
        list_id: list.list_id.clone(),
    };

    h.press(&bob(), &complete).await?;
    assert_eq!(
        h.last_answer().await,
        Some((Some("You are not the owner of the list.".to_string()), false))
    );
    assert!(h.backend.list(&list.list_id).await?.is_some());

    let owner_message = h.rendered(&alice(), &list.list_id).await?;
    let bob_message = h.rendered(&bob(), &list.list_id).await?;
    h.press(&alice(), &complete).await?;

    assert!(h.backend.list(&list.list_id).await?.is_none());
    let summary = completion_summary(&list.items);
    for (user, message) in [(alice(), owner_message), (bob(), bob_message)] {
        let sent = h.transport.sent_to(user.chat_id).await;
        assert_eq!(sent.last(), Some(&summary));
        assert!(!h.transport.live_in(user.chat_id).await.contains(&message));
    }
    assert_eq!(
        h.last_answer().await,
        Some((Some("List completed!".to_string()), false))
    );
    Ok(())
}

#[tokio::test]
async fn malformed_callbacks_are_answered() -> Result<()> {
    let h = harness();
    h.actions
        .callback(&alice(), "cb", None, "launch_rockets")
        .await?;
    assert_eq!(h.transport.answers().await, vec![(None, false)]);
    Ok(())
}

#[tokio::test]
async fn toggle_is_answered_when_the_list_cannot_be_redrawn() -> Result<()> {
    let h = harness();
    h.actions.start(&alice(), None).await?;
    h.type_text(&alice(), "Milk").await?;
    let list = h.own_list(&alice()).await?;
    let milk = list.items[0].item_id.clone();

    h.transport.set_offline(true).await;
    h.press(
        &alice(),
        &ListCallback::Toggle {
            list_id: list.list_id.clone(),
            item_id: milk.clone(),
            page: 1,
        },
    )
    .await?;

    assert!(h.list(&list.list_id).await?.item(&milk).context("milk exists")?.bought);
    assert_eq!(
        h.last_answer().await,
        Some((Some(SOMETHING_WENT_WRONG.to_string()), true))
    );
    Ok(())
}

#[tokio::test]
async fn page_turn_is_answered_when_the_list_cannot_be_redrawn() -> Result<()> {
    let h = harness();
    h.actions.start(&alice(), None).await?;
    h.type_text(&alice(), "1\n2\n3\n4\n5\n6\n7").await?;
    let list = h.own_list(&alice()).await?;

    h.transport.set_offline(true).await;
    h.press(
        &alice(),
        &ListCallback::Next {
            list_id: list.list_id.clone(),
            page: 1,
        },
    )
    .await?;

    assert_eq!(
        h.last_answer().await,
        Some((Some(SOMETHING_WENT_WRONG.to_string()), true))
    );
    Ok(())
}

#[tokio::test]
async fn text_is_stored_even_when_the_list_cannot_be_redrawn() -> Result<()> {
    let h = harness();
    h.actions.start(&alice(), None).await?;

    h.transport.set_offline(true).await;
    let message_id = h.type_text(&alice(), "Milk").await?;

    let list = h.own_list(&alice()).await?;
    assert_eq!(list.items.len(), 1);
    assert!(!h.transport.live_in(alice().chat_id).await.contains(&message_id));
    Ok(())
}
