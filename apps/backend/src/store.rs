use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shopping_proto::{ItemRecord, ListRecord, RECENT_HISTORY_LIMIT, UserRecord};
use tokio::sync::Mutex;
use tokio_postgres::{GenericClient, Row, types::FromSql};
use uuid::Uuid;

use crate::db::ShoppingDb;


#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("db error: {0}")]
    Db(String),
}

#[derive(Debug, Clone)]
pub struct UserAction {
    pub user_id: i64,
    pub chat_id: i64,
    pub username: Option<String>,
    pub at: DateTime<Utc>,
}

/// State captured right before a completed list is deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionSnapshot {
    pub users: Vec<i64>,
    pub items: Vec<ItemRecord>,
    pub last_message_ids_for_users: BTreeMap<i64, Vec<i32>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareOutcome {
    Shared,
    ListNotFound,
    AlreadyMember,
    SubscribedElsewhere,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsubscribeOutcome {
    Unsubscribed,
    ListNotFound,
    NotMember,
    OwnerCannotUnsubscribe,
}

#[async_trait]
pub trait ShoppingStore: Send + Sync {
    async fn get_user(&self, user_id: i64) -> Result<Option<UserRecord>, StoreError>;

    /// Upserts identity fields and prepends `at` to the capped `last_actions`.
    async fn record_user_action(&self, action: UserAction) -> Result<(), StoreError>;

    async fn get_last_subscribed_list(&self, user_id: i64) -> Result<Option<String>, StoreError>;

    /// Returns `false` when `list_id` is not one of the user's lists.
    async fn set_last_subscribed_list(
        &self,
        user_id: i64,
        list_id: &str,
    ) -> Result<bool, StoreError>;

    async fn clear_last_subscribed_list(&self, user_id: i64) -> Result<(), StoreError>;

    async fn create_list(&self, owner_id: i64) -> Result<ListRecord, StoreError>;

    async fn get_list(&self, list_id: &str) -> Result<Option<ListRecord>, StoreError>;

    async fn list_user_lists(&self, user_id: i64) -> Result<Vec<ListRecord>, StoreError>;

    async fn add_items(
        &self,
        list_id: &str,
        names: Vec<String>,
    ) -> Result<Vec<ItemRecord>, StoreError>;

    async fn add_item(&self, list_id: &str, name: String) -> Result<ItemRecord, StoreError> {
        self.add_items(list_id, vec![name])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Db("item append returned no rows".to_string()))
    }

    /// Flips `bought` and returns the new value.
    async fn toggle_item(&self, list_id: &str, item_id: &str) -> Result<bool, StoreError>;

    /// Returns whether an item was removed. Deleting an absent item is not an error.
    async fn delete_item(&self, list_id: &str, item_id: &str) -> Result<bool, StoreError>;

    async fn complete_list(&self, list_id: &str) -> Result<Option<CompletionSnapshot>, StoreError>;

    async fn share_list(&self, list_id: &str, user_id: i64) -> Result<ShareOutcome, StoreError>;

    async fn unsubscribe(
        &self,
        list_id: &str,
        user_id: i64,
    ) -> Result<UnsubscribeOutcome, StoreError>;

    async fn get_current_page(&self, user_id: i64, list_id: &str) -> Result<u32, StoreError>;

    async fn set_current_page(
        &self,
        user_id: i64,
        list_id: &str,
        page: u32,
    ) -> Result<(), StoreError>;

    async fn clear_current_page(&self, user_id: i64, list_id: &str) -> Result<(), StoreError>;

    async fn get_skip_confirm(&self, user_id: i64, list_id: &str) -> Result<bool, StoreError>;

    async fn set_skip_confirm(
        &self,
        user_id: i64,
        list_id: &str,
        value: bool,
    ) -> Result<(), StoreError>;

    async fn clear_skip_confirm(&self, user_id: i64, list_id: &str) -> Result<(), StoreError>;

    /// Most recent first.
    async fn get_list_messages(&self, user_id: i64, list_id: &str)
    -> Result<Vec<i32>, StoreError>;

    async fn push_list_message(
        &self,
        user_id: i64,
        list_id: &str,
        message_id: i32,
    ) -> Result<(), StoreError>;

    async fn remove_list_message(
        &self,
        user_id: i64,
        list_id: &str,
        message_id: i32,
    ) -> Result<(), StoreError>;

    async fn clear_list_messages(&self, user_id: i64, list_id: &str) -> Result<(), StoreError>;

    async fn set_notification(&self, list_id: &str, text: &str) -> Result<(), StoreError>;

    async fn clear_notification(&self, list_id: &str) -> Result<(), StoreError>;
}

pub fn memory() -> Arc<dyn ShoppingStore> {
    Arc::new(MemoryShoppingStore::default())
}

pub fn postgres(db: Arc<ShoppingDb>) -> Arc<dyn ShoppingStore> {
    Arc::new(PostgresShoppingStore { db })
}

/// 24 lowercase hex characters: the timestamp and counter prefix of a v7 uuid.
#[must_use]
pub fn new_record_id() -> String {
    let id = Uuid::now_v7();
    hex::encode(&id.as_bytes()[..12])
}

fn push_capped<T>(sequence: &mut Vec<T>, value: T) {
    sequence.insert(0, value);
    sequence.truncate(RECENT_HISTORY_LIMIT);
}

#[derive(Default)]
struct MemoryShoppingStore {
    inner: Mutex<MemoryShoppingInner>,
}

#[derive(Default)]
struct MemoryShoppingInner {
    users: HashMap<i64, UserRecord>,
    lists: HashMap<String, ListRecord>,
    ui_state: HashMap<(i64, String), UiStateRow>,
}

#[derive(Debug, Clone, Default)]
struct UiStateRow {
    current_page: Option<u32>,
    skip_confirm: Option<bool>,
    last_list_messages: Vec<i32>,
}

impl MemoryShoppingInner {
    fn user_mut(&mut self, user_id: i64) -> &mut UserRecord {
        self.users.entry(user_id).or_insert_with(|| UserRecord {
            user_id,
            chat_id: None,
            username: None,
            list_ids: Vec::new(),
            last_subscribed_list_id: None,
            last_actions: Vec::new(),
        })
    }

    fn ui(&self, user_id: i64, list_id: &str) -> Option<&UiStateRow> {
        self.ui_state.get(&(user_id, list_id.to_string()))
    }

    fn ui_mut(&mut self, user_id: i64, list_id: &str) -> &mut UiStateRow {
        self.ui_state
            .entry((user_id, list_id.to_string()))
            .or_default()
    }

    fn list_mut(&mut self, list_id: &str) -> Result<&mut ListRecord, StoreError> {
        self.lists
            .get_mut(list_id)
            .ok_or_else(|| StoreError::NotFound(format!("list {list_id}")))
    }
}

#[async_trait]
impl ShoppingStore for MemoryShoppingStore {
    async fn get_user(&self, user_id: i64) -> Result<Option<UserRecord>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.users.get(&user_id).cloned())
    }

    async fn record_user_action(&self, action: UserAction) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let user = inner.user_mut(action.user_id);
        user.chat_id = Some(action.chat_id);
        user.username = action.username;
        push_capped(&mut user.last_actions, action.at);
        Ok(())
    }

    async fn get_last_subscribed_list(&self, user_id: i64) -> Result<Option<String>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .users
            .get(&user_id)
            .and_then(|user| user.last_subscribed_list_id.clone()))
    }

    async fn set_last_subscribed_list(
        &self,
        user_id: i64,
        list_id: &str,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let Some(user) = inner.users.get_mut(&user_id) else {
            return Ok(false);
        };
        if !user.list_ids.iter().any(|id| id == list_id) {
            return Ok(false);
        }
        user.last_subscribed_list_id = Some(list_id.to_string());
        Ok(true)
    }

    async fn clear_last_subscribed_list(&self, user_id: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(user) = inner.users.get_mut(&user_id) {
            user.last_subscribed_list_id = None;
        }
        Ok(())
    }

    async fn create_list(&self, owner_id: i64) -> Result<ListRecord, StoreError> {
        let mut inner = self.inner.lock().await;
        let list = ListRecord {
            list_id: new_record_id(),
            owner_id,
            users: vec![owner_id],
            items: Vec::new(),
            completed: false,
            last_notification_text: None,
        };
        inner.lists.insert(list.list_id.clone(), list.clone());
        inner.user_mut(owner_id).list_ids.push(list.list_id.clone());
        Ok(list)
    }

    async fn get_list(&self, list_id: &str) -> Result<Option<ListRecord>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.lists.get(list_id).cloned())
    }

    async fn list_user_lists(&self, user_id: i64) -> Result<Vec<ListRecord>, StoreError> {
        let inner = self.inner.lock().await;
        let Some(user) = inner.users.get(&user_id) else {
            return Ok(Vec::new());
        };
        Ok(user
            .list_ids
            .iter()
            .filter_map(|list_id| inner.lists.get(list_id).cloned())
            .collect())
    }

    async fn add_items(
        &self,
        list_id: &str,
        names: Vec<String>,
    ) -> Result<Vec<ItemRecord>, StoreError> {
        let mut inner = self.inner.lock().await;
        let list = inner.list_mut(list_id)?;
        let added: Vec<ItemRecord> = names
            .into_iter()
            .map(|name| ItemRecord {
                item_id: new_record_id(),
                name,
                bought: false,
            })
            .collect();
        list.items.extend(added.iter().cloned());
        Ok(added)
    }

    async fn toggle_item(&self, list_id: &str, item_id: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let list = inner.list_mut(list_id)?;
        let item = list
            .items
            .iter_mut()
            .find(|item| item.item_id == item_id)
            .ok_or_else(|| StoreError::NotFound(format!("item {item_id}")))?;
        item.bought = !item.bought;
        Ok(item.bought)
    }

    async fn delete_item(&self, list_id: &str, item_id: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let list = inner.list_mut(list_id)?;
        let before = list.items.len();
        list.items.retain(|item| item.item_id != item_id);
        Ok(list.items.len() != before)
    }

    async fn complete_list(&self, list_id: &str) -> Result<Option<CompletionSnapshot>, StoreError> {
        let mut inner = self.inner.lock().await;
        let Some(mut list) = inner.lists.remove(list_id) else {
            return Ok(None);
        };
        list.completed = true;

        let last_message_ids_for_users = list
            .users
            .iter()
            .map(|user_id| {
                let messages = inner
                    .ui(*user_id, list_id)
                    .map(|row| row.last_list_messages.clone())
                    .unwrap_or_default();
                (*user_id, messages)
            })
            .collect();

        for user in inner.users.values_mut() {
            user.list_ids.retain(|id| id != list_id);
            if user.last_subscribed_list_id.as_deref() == Some(list_id) {
                user.last_subscribed_list_id = None;
            }
        }
        inner.ui_state.retain(|(_, id), _| id != list_id);

        Ok(Some(CompletionSnapshot {
            users: list.users,
            items: list.items,
            last_message_ids_for_users,
        }))
    }

    async fn share_list(&self, list_id: &str, user_id: i64) -> Result<ShareOutcome, StoreError> {
        let mut inner = self.inner.lock().await;
        let Some(list) = inner.lists.get(list_id) else {
            return Ok(ShareOutcome::ListNotFound);
        };
        if list.is_member(user_id) {
            return Ok(ShareOutcome::AlreadyMember);
        }
        let subscribed = inner
            .users
            .get(&user_id)
            .and_then(|user| user.last_subscribed_list_id.as_deref());
        if subscribed.is_some_and(|current| current != list_id) {
            return Ok(ShareOutcome::SubscribedElsewhere);
        }

        inner.list_mut(list_id)?.users.push(user_id);
        let user = inner.user_mut(user_id);
        if !user.list_ids.iter().any(|id| id == list_id) {
            user.list_ids.push(list_id.to_string());
        }
        user.last_subscribed_list_id = Some(list_id.to_string());
        Ok(ShareOutcome::Shared)
    }

    async fn unsubscribe(
        &self,
        list_id: &str,
        user_id: i64,
    ) -> Result<UnsubscribeOutcome, StoreError> {
        let mut inner = self.inner.lock().await;
        let Some(list) = inner.lists.get_mut(list_id) else {
            return Ok(UnsubscribeOutcome::ListNotFound);
        };
        if !list.is_member(user_id) {
            return Ok(UnsubscribeOutcome::NotMember);
        }
        if list.owner_id == user_id {
            return Ok(UnsubscribeOutcome::OwnerCannotUnsubscribe);
        }
        list.users.retain(|id| *id != user_id);

        if let Some(user) = inner.users.get_mut(&user_id) {
            user.list_ids.retain(|id| id != list_id);
            if user.last_subscribed_list_id.as_deref() == Some(list_id) {
                user.last_subscribed_list_id = None;
            }
        }
        inner.ui_state.remove(&(user_id, list_id.to_string()));
        Ok(UnsubscribeOutcome::Unsubscribed)
    }

    async fn get_current_page(&self, user_id: i64, list_id: &str) -> Result<u32, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .ui(user_id, list_id)
            .and_then(|row| row.current_page)
            .unwrap_or(1))
    }

    async fn set_current_page(
        &self,
        user_id: i64,
        list_id: &str,
        page: u32,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.ui_mut(user_id, list_id).current_page = Some(page);
        Ok(())
    }

    async fn clear_current_page(&self, user_id: i64, list_id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(row) = inner.ui_state.get_mut(&(user_id, list_id.to_string())) {
            row.current_page = None;
        }
        Ok(())
    }

    async fn get_skip_confirm(&self, user_id: i64, list_id: &str) -> Result<bool, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .ui(user_id, list_id)
            .and_then(|row| row.skip_confirm)
            .unwrap_or(false))
    }

    async fn set_skip_confirm(
        &self,
        user_id: i64,
        list_id: &str,
        value: bool,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.ui_mut(user_id, list_id).skip_confirm = Some(value);
        Ok(())
    }

    async fn clear_skip_confirm(&self, user_id: i64, list_id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(row) = inner.ui_state.get_mut(&(user_id, list_id.to_string())) {
            row.skip_confirm = None;
        }
        Ok(())
    }

    async fn get_list_messages(
        &self,
        user_id: i64,
        list_id: &str,
    ) -> Result<Vec<i32>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .ui(user_id, list_id)
            .map(|row| row.last_list_messages.clone())
            .unwrap_or_default())
    }

    async fn push_list_message(
        &self,
        user_id: i64,
        list_id: &str,
        message_id: i32,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        push_capped(
            &mut inner.ui_mut(user_id, list_id).last_list_messages,
            message_id,
        );
        Ok(())
    }

    async fn remove_list_message(
        &self,
        user_id: i64,
        list_id: &str,
        message_id: i32,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(row) = inner.ui_state.get_mut(&(user_id, list_id.to_string())) {
            row.last_list_messages.retain(|id| *id != message_id);
        }
        Ok(())
    }

    async fn clear_list_messages(&self, user_id: i64, list_id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(row) = inner.ui_state.get_mut(&(user_id, list_id.to_string())) {
            row.last_list_messages.clear();
        }
        Ok(())
    }

    async fn set_notification(&self, list_id: &str, text: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.list_mut(list_id)?.last_notification_text = Some(text.to_string());
        Ok(())
    }

    async fn clear_notification(&self, list_id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.list_mut(list_id)?.last_notification_text = None;
        Ok(())
    }
}

struct PostgresShoppingStore {
    db: Arc<ShoppingDb>,
}

#[async_trait]
impl ShoppingStore for PostgresShoppingStore {
    async fn get_user(&self, user_id: i64) -> Result<Option<UserRecord>, StoreError> {
        let client = self.db.client();
        let client = client.lock().await;
        let row = client
            .query_opt(
                r#"
                SELECT user_id,
                       chat_id,
                       username,
                       list_ids,
                       last_subscribed_list_id,
                       last_actions
                  FROM shopping.users
                 WHERE user_id = $1
                "#,
                &[&user_id],
            )
            .await
            .map_err(db_error)?;
        row.as_ref()
            .map(map_user_row)
            .transpose()
            .map_err(StoreError::Db)
    }

    async fn record_user_action(&self, action: UserAction) -> Result<(), StoreError> {
        let client = self.db.client();
        let client = client.lock().await;
        client
            .execute(
                r#"
                INSERT INTO shopping.users (user_id, chat_id, username, last_actions)
                VALUES ($1, $2, $3, ARRAY[$4::timestamptz])
                ON CONFLICT (user_id) DO UPDATE
                   SET chat_id = EXCLUDED.chat_id,
                       username = EXCLUDED.username,
                       last_actions = (ARRAY[$4::timestamptz] || shopping.users.last_actions)[1:3]
                "#,
                &[
                    &action.user_id,
                    &action.chat_id,
                    &action.username,
                    &action.at,
                ],
            )
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn get_last_subscribed_list(&self, user_id: i64) -> Result<Option<String>, StoreError> {
        let client = self.db.client();
        let client = client.lock().await;
        let row = client
            .query_opt(
                "SELECT last_subscribed_list_id FROM shopping.users WHERE user_id = $1",
                &[&user_id],
            )
            .await
            .map_err(db_error)?;
        match row {
            Some(row) => column(&row, "last_subscribed_list_id").map_err(StoreError::Db),
            None => Ok(None),
        }
    }

    async fn set_last_subscribed_list(
        &self,
        user_id: i64,
        list_id: &str,
    ) -> Result<bool, StoreError> {
        let client = self.db.client();
        let client = client.lock().await;
        let updated = client
            .execute(
                r#"
                UPDATE shopping.users
                   SET last_subscribed_list_id = $2::text
                 WHERE user_id = $1
                   AND $2::text = ANY(list_ids)
                "#,
                &[&user_id, &list_id],
            )
            .await
            .map_err(db_error)?;
        Ok(updated > 0)
    }

    async fn clear_last_subscribed_list(&self, user_id: i64) -> Result<(), StoreError> {
        let client = self.db.client();
        let client = client.lock().await;
        client
            .execute(
                "UPDATE shopping.users SET last_subscribed_list_id = NULL WHERE user_id = $1",
                &[&user_id],
            )
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn create_list(&self, owner_id: i64) -> Result<ListRecord, StoreError> {
        let client = self.db.client();
        let mut client = client.lock().await;
        let tx = client.transaction().await.map_err(db_error)?;

        let list_id = new_record_id();
        tx.execute(
            r#"
            INSERT INTO shopping.lists (list_id, owner_id, users)
            VALUES ($1, $2, ARRAY[$2::bigint])
            "#,
            &[&list_id, &owner_id],
        )
        .await
        .map_err(db_error)?;
        tx.execute(
            r#"
            INSERT INTO shopping.users (user_id, list_ids)
            VALUES ($1, ARRAY[$2::text])
            ON CONFLICT (user_id) DO UPDATE
               SET list_ids = array_append(shopping.users.list_ids, $2::text)
            "#,
            &[&owner_id, &list_id],
        )
        .await
        .map_err(db_error)?;
        tx.commit().await.map_err(db_error)?;

        Ok(ListRecord {
            list_id,
            owner_id,
            users: vec![owner_id],
            items: Vec::new(),
            completed: false,
            last_notification_text: None,
        })
    }

    async fn get_list(&self, list_id: &str) -> Result<Option<ListRecord>, StoreError> {
        let client = self.db.client();
        let client = client.lock().await;
        load_list(&*client, list_id).await
    }

    async fn list_user_lists(&self, user_id: i64) -> Result<Vec<ListRecord>, StoreError> {
        let client = self.db.client();
        let client = client.lock().await;
        let Some(row) = client
            .query_opt(
                "SELECT list_ids FROM shopping.users WHERE user_id = $1",
                &[&user_id],
            )
            .await
            .map_err(db_error)?
        else {
            return Ok(Vec::new());
        };
        let list_ids: Vec<String> = column(&row, "list_ids").map_err(StoreError::Db)?;

        let mut lists = Vec::with_capacity(list_ids.len());
        for list_id in list_ids {
            if let Some(list) = load_list(&*client, &list_id).await? {
                lists.push(list);
            }
        }
        Ok(lists)
    }

    async fn add_items(
        &self,
        list_id: &str,
        names: Vec<String>,
    ) -> Result<Vec<ItemRecord>, StoreError> {
        let client = self.db.client();
        let mut client = client.lock().await;
        let tx = client.transaction().await.map_err(db_error)?;

        let exists = tx
            .query_opt(
                "SELECT 1 FROM shopping.lists WHERE list_id = $1 FOR UPDATE",
                &[&list_id],
            )
            .await
            .map_err(db_error)?;
        if exists.is_none() {
            return Err(StoreError::NotFound(format!("list {list_id}")));
        }
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let added: Vec<ItemRecord> = names
            .into_iter()
            .map(|name| ItemRecord {
                item_id: new_record_id(),
                name,
                bought: false,
            })
            .collect();
        let item_ids: Vec<&str> = added.iter().map(|item| item.item_id.as_str()).collect();
        let item_names: Vec<&str> = added.iter().map(|item| item.name.as_str()).collect();

        tx.execute(
            r#"
            INSERT INTO shopping.list_items (list_id, item_id, name)
            SELECT $1::text, batch.item_id, batch.name
              FROM UNNEST($2::text[], $3::text[]) WITH ORDINALITY AS batch(item_id, name, ordinal)
             ORDER BY batch.ordinal
            "#,
            &[&list_id, &item_ids, &item_names],
        )
        .await
        .map_err(db_error)?;
        tx.commit().await.map_err(db_error)?;
        Ok(added)
    }

    async fn toggle_item(&self, list_id: &str, item_id: &str) -> Result<bool, StoreError> {
        let client = self.db.client();
        let client = client.lock().await;
        let row = client
            .query_opt(
                r#"
                UPDATE shopping.list_items
                   SET bought = NOT bought
                 WHERE list_id = $1
                   AND item_id = $2
                RETURNING bought
                "#,
                &[&list_id, &item_id],
            )
            .await
            .map_err(db_error)?
            .ok_or_else(|| StoreError::NotFound(format!("item {item_id} in list {list_id}")))?;
        column(&row, "bought").map_err(StoreError::Db)
    }

    async fn delete_item(&self, list_id: &str, item_id: &str) -> Result<bool, StoreError> {
        let client = self.db.client();
        let client = client.lock().await;
        let exists = client
            .query_opt(
                "SELECT 1 FROM shopping.lists WHERE list_id = $1",
                &[&list_id],
            )
            .await
            .map_err(db_error)?;
        if exists.is_none() {
            return Err(StoreError::NotFound(format!("list {list_id}")));
        }
        let deleted = client
            .execute(
                "DELETE FROM shopping.list_items WHERE list_id = $1 AND item_id = $2",
                &[&list_id, &item_id],
            )
            .await
            .map_err(db_error)?;
        Ok(deleted > 0)
    }

    async fn complete_list(&self, list_id: &str) -> Result<Option<CompletionSnapshot>, StoreError> {
        let client = self.db.client();
        let mut client = client.lock().await;
        let tx = client.transaction().await.map_err(db_error)?;

        let Some(row) = tx
            .query_opt(
                r#"
                UPDATE shopping.lists
                   SET completed = TRUE
                 WHERE list_id = $1
                RETURNING users
                "#,
                &[&list_id],
            )
            .await
            .map_err(db_error)?
        else {
            return Ok(None);
        };
        let users: Vec<i64> = column(&row, "users").map_err(StoreError::Db)?;
        let items = load_items(&tx, list_id).await?;

        let mut last_message_ids_for_users: BTreeMap<i64, Vec<i32>> =
            users.iter().map(|user_id| (*user_id, Vec::new())).collect();
        let message_rows = tx
            .query(
                r#"
                SELECT user_id, last_list_messages
                  FROM shopping.list_ui_state
                 WHERE list_id = $1
                "#,
                &[&list_id],
            )
            .await
            .map_err(db_error)?;
        for row in &message_rows {
            let user_id: i64 = column(row, "user_id").map_err(StoreError::Db)?;
            if let Some(entry) = last_message_ids_for_users.get_mut(&user_id) {
                *entry = column(row, "last_list_messages").map_err(StoreError::Db)?;
            }
        }

        tx.execute(
            r#"
            UPDATE shopping.users
               SET list_ids = array_remove(list_ids, $1::text),
                   last_subscribed_list_id = CASE
                       WHEN last_subscribed_list_id = $1::text THEN NULL
                       ELSE last_subscribed_list_id
                   END
             WHERE $1::text = ANY(list_ids)
                OR last_subscribed_list_id = $1::text
            "#,
            &[&list_id],
        )
        .await
        .map_err(db_error)?;
        tx.execute(
            "DELETE FROM shopping.list_ui_state WHERE list_id = $1",
            &[&list_id],
        )
        .await
        .map_err(db_error)?;
        tx.execute("DELETE FROM shopping.lists WHERE list_id = $1", &[&list_id])
            .await
            .map_err(db_error)?;
        tx.commit().await.map_err(db_error)?;

        Ok(Some(CompletionSnapshot {
            users,
            items,
            last_message_ids_for_users,
        }))
    }

    async fn share_list(&self, list_id: &str, user_id: i64) -> Result<ShareOutcome, StoreError> {
        let client = self.db.client();
        let mut client = client.lock().await;
        let tx = client.transaction().await.map_err(db_error)?;

        let Some(list_row) = tx
            .query_opt(
                "SELECT users FROM shopping.lists WHERE list_id = $1 FOR UPDATE",
                &[&list_id],
            )
            .await
            .map_err(db_error)?
        else {
            return Ok(ShareOutcome::ListNotFound);
        };
        let members: Vec<i64> = column(&list_row, "users").map_err(StoreError::Db)?;
        if members.contains(&user_id) {
            return Ok(ShareOutcome::AlreadyMember);
        }

        let subscribed: Option<String> = match tx
            .query_opt(
                "SELECT last_subscribed_list_id FROM shopping.users WHERE user_id = $1 FOR UPDATE",
                &[&user_id],
            )
            .await
            .map_err(db_error)?
        {
            Some(row) => column(&row, "last_subscribed_list_id").map_err(StoreError::Db)?,
            None => None,
        };
        if subscribed
            .as_deref()
            .is_some_and(|current| current != list_id)
        {
            return Ok(ShareOutcome::SubscribedElsewhere);
        }

        tx.execute(
            "UPDATE shopping.lists SET users = array_append(users, $2::bigint) WHERE list_id = $1",
            &[&list_id, &user_id],
        )
        .await
        .map_err(db_error)?;
        tx.execute(
            r#"
            INSERT INTO shopping.users (user_id, list_ids, last_subscribed_list_id)
            VALUES ($1, ARRAY[$2::text], $2::text)
            ON CONFLICT (user_id) DO UPDATE
               SET list_ids = CASE
                       WHEN $2::text = ANY(shopping.users.list_ids) THEN shopping.users.list_ids
                       ELSE array_append(shopping.users.list_ids, $2::text)
                   END,
                   last_subscribed_list_id = $2::text
            "#,
            &[&user_id, &list_id],
        )
        .await
        .map_err(db_error)?;
        tx.commit().await.map_err(db_error)?;
        Ok(ShareOutcome::Shared)
    }

    async fn unsubscribe(
        &self,
        list_id: &str,
        user_id: i64,
    ) -> Result<UnsubscribeOutcome, StoreError> {
        let client = self.db.client();
        let mut client = client.lock().await;
        let tx = client.transaction().await.map_err(db_error)?;

        let Some(list_row) = tx
            .query_opt(
                "SELECT owner_id, users FROM shopping.lists WHERE list_id = $1 FOR UPDATE",
                &[&list_id],
            )
            .await
            .map_err(db_error)?
        else {
            return Ok(UnsubscribeOutcome::ListNotFound);
        };
        let owner_id: i64 = column(&list_row, "owner_id").map_err(StoreError::Db)?;
        let members: Vec<i64> = column(&list_row, "users").map_err(StoreError::Db)?;
        if !members.contains(&user_id) {
            return Ok(UnsubscribeOutcome::NotMember);
        }
        if owner_id == user_id {
            return Ok(UnsubscribeOutcome::OwnerCannotUnsubscribe);
        }

        tx.execute(
            "UPDATE shopping.lists SET users = array_remove(users, $2::bigint) WHERE list_id = $1",
            &[&list_id, &user_id],
        )
        .await
        .map_err(db_error)?;
        tx.execute(
            r#"
            UPDATE shopping.users
               SET list_ids = array_remove(list_ids, $2::text),
                   last_subscribed_list_id = CASE
                       WHEN last_subscribed_list_id = $2::text THEN NULL
                       ELSE last_subscribed_list_id
                   END
             WHERE user_id = $1
            "#,
            &[&user_id, &list_id],
        )
        .await
        .map_err(db_error)?;
        tx.execute(
            "DELETE FROM shopping.list_ui_state WHERE user_id = $1 AND list_id = $2",
            &[&user_id, &list_id],
        )
        .await
        .map_err(db_error)?;
        tx.commit().await.map_err(db_error)?;
        Ok(UnsubscribeOutcome::Unsubscribed)
    }

    async fn get_current_page(&self, user_id: i64, list_id: &str) -> Result<u32, StoreError> {
        let client = self.db.client();
        let client = client.lock().await;
        let row = client
            .query_opt(
                r#"
                SELECT current_page
                  FROM shopping.list_ui_state
                 WHERE user_id = $1 AND list_id = $2
                "#,
                &[&user_id, &list_id],
            )
            .await
            .map_err(db_error)?;
        let page: Option<i32> = match row {
            Some(row) => column(&row, "current_page").map_err(StoreError::Db)?,
            None => None,
        };
        Ok(page
            .and_then(|page| u32::try_from(page).ok())
            .filter(|page| *page > 0)
            .unwrap_or(1))
    }

    async fn set_current_page(
        &self,
        user_id: i64,
        list_id: &str,
        page: u32,
    ) -> Result<(), StoreError> {
        let page = i32::try_from(page).unwrap_or(i32::MAX);
        let client = self.db.client();
        let client = client.lock().await;
        client
            .execute(
                r#"
                INSERT INTO shopping.list_ui_state (user_id, list_id, current_page)
                VALUES ($1, $2, $3)
                ON CONFLICT (user_id, list_id) DO UPDATE
                   SET current_page = EXCLUDED.current_page
                "#,
                &[&user_id, &list_id, &page],
            )
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn clear_current_page(&self, user_id: i64, list_id: &str) -> Result<(), StoreError> {
        let client = self.db.client();
        let client = client.lock().await;
        client
            .execute(
                r#"
                UPDATE shopping.list_ui_state
                   SET current_page = NULL
                 WHERE user_id = $1 AND list_id = $2
                "#,
                &[&user_id, &list_id],
            )
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn get_skip_confirm(&self, user_id: i64, list_id: &str) -> Result<bool, StoreError> {
        let client = self.db.client();
        let client = client.lock().await;
        let row = client
            .query_opt(
                r#"
                SELECT skip_confirm
                  FROM shopping.list_ui_state
                 WHERE user_id = $1 AND list_id = $2
                "#,
                &[&user_id, &list_id],
            )
            .await
            .map_err(db_error)?;
        let value: Option<bool> = match row {
            Some(row) => column(&row, "skip_confirm").map_err(StoreError::Db)?,
            None => None,
        };
        Ok(value.unwrap_or(false))
    }

    async fn set_skip_confirm(
        &self,
        user_id: i64,
        list_id: &str,
        value: bool,
    ) -> Result<(), StoreError> {
        let client = self.db.client();
        let client = client.lock().await;
        client
            .execute(
                r#"
                INSERT INTO shopping.list_ui_state (user_id, list_id, skip_confirm)
                VALUES ($1, $2, $3)
                ON CONFLICT (user_id, list_id) DO UPDATE
                   SET skip_confirm = EXCLUDED.skip_confirm
                "#,
                &[&user_id, &list_id, &value],
            )
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn clear_skip_confirm(&self, user_id: i64, list_id: &str) -> Result<(), StoreError> {
        let client = self.db.client();
        let client = client.lock().await;
        client
            .execute(
                r#"
                UPDATE shopping.list_ui_state
                   SET skip_confirm = NULL
                 WHERE user_id = $1 AND list_id = $2
                "#,
                &[&user_id, &list_id],
            )
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn get_list_messages(
        &self,
        user_id: i64,
        list_id: &str,
    ) -> Result<Vec<i32>, StoreError> {
        let client = self.db.client();
        let client = client.lock().await;
        let row = client
            .query_opt(
                r#"
                SELECT last_list_messages
                  FROM shopping.list_ui_state
                 WHERE user_id = $1 AND list_id = $2
                "#,
                &[&user_id, &list_id],
            )
            .await
            .map_err(db_error)?;
        match row {
            Some(row) => column(&row, "last_list_messages").map_err(StoreError::Db),
            None => Ok(Vec::new()),
        }
    }

    async fn push_list_message(
        &self,
        user_id: i64,
        list_id: &str,
        message_id: i32,
    ) -> Result<(), StoreError> {
        let client = self.db.client();
        let client = client.lock().await;
        client
            .execute(
                r#"
                INSERT INTO shopping.list_ui_state (user_id, list_id, last_list_messages)
                VALUES ($1, $2, ARRAY[$3::integer])
                ON CONFLICT (user_id, list_id) DO UPDATE
                   SET last_list_messages =
                       (ARRAY[$3::integer] || shopping.list_ui_state.last_list_messages)[1:3]
                "#,
                &[&user_id, &list_id, &message_id],
            )
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn remove_list_message(
        &self,
        user_id: i64,
        list_id: &str,
        message_id: i32,
    ) -> Result<(), StoreError> {
        let client = self.db.client();
        let client = client.lock().await;
        client
            .execute(
                r#"
                UPDATE shopping.list_ui_state
                   SET last_list_messages = array_remove(last_list_messages, $3::integer)
                 WHERE user_id = $1 AND list_id = $2
                "#,
                &[&user_id, &list_id, &message_id],
            )
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn clear_list_messages(&self, user_id: i64, list_id: &str) -> Result<(), StoreError> {
        let client = self.db.client();
        let client = client.lock().await;
        client
            .execute(
                r#"
                UPDATE shopping.list_ui_state
                   SET last_list_messages = '{}'
                 WHERE user_id = $1 AND list_id = $2
                "#,
                &[&user_id, &list_id],
            )
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn set_notification(&self, list_id: &str, text: &str) -> Result<(), StoreError> {
        let client = self.db.client();
        let client = client.lock().await;
        let updated = client
            .execute(
                "UPDATE shopping.lists SET last_notification_text = $2 WHERE list_id = $1",
                &[&list_id, &text],
            )
            .await
            .map_err(db_error)?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("list {list_id}")));
        }
        Ok(())
    }

    async fn clear_notification(&self, list_id: &str) -> Result<(), StoreError> {
        let client = self.db.client();
        let client = client.lock().await;
        let updated = client
            .execute(
                "UPDATE shopping.lists SET last_notification_text = NULL WHERE list_id = $1",
                &[&list_id],
            )
            .await
            .map_err(db_error)?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("list {list_id}")));
        }
        Ok(())
    }
}

async fn load_list<C>(client: &C, list_id: &str) -> Result<Option<ListRecord>, StoreError>
where
    C: GenericClient + Sync,
{
    let Some(row) = client
        .query_opt(
            r#"
            SELECT list_id,
                   owner_id,
                   users,
                   completed,
                   last_notification_text
              FROM shopping.lists
             WHERE list_id = $1
            "#,
            &[&list_id],
        )
        .await
        .map_err(db_error)?
    else {
        return Ok(None);
    };
    let items = load_items(client, list_id).await?;
    map_list_row(&row, items).map(Some).map_err(StoreError::Db)
}

async fn load_items<C>(client: &C, list_id: &str) -> Result<Vec<ItemRecord>, StoreError>
where
    C: GenericClient + Sync,
{
    let rows = client
        .query(
            r#"
            SELECT item_id, name, bought
              FROM shopping.list_items
             WHERE list_id = $1
             ORDER BY position
            "#,
            &[&list_id],
        )
        .await
        .map_err(db_error)?;
    rows.iter()
        .map(map_item_row)
        .collect::<Result<Vec<_>, _>>()
        .map_err(StoreError::Db)
}

fn map_user_row(row: &Row) -> Result<UserRecord, String> {
    Ok(UserRecord {
        user_id: column(row, "user_id")?,
        chat_id: column(row, "chat_id")?,
        username: column(row, "username")?,
        list_ids: column(row, "list_ids")?,
        last_subscribed_list_id: column(row, "last_subscribed_list_id")?,
        last_actions: column(row, "last_actions")?,
    })
}

fn map_list_row(row: &Row, items: Vec<ItemRecord>) -> Result<ListRecord, String> {
    Ok(ListRecord {
        list_id: column(row, "list_id")?,
        owner_id: column(row, "owner_id")?,
        users: column(row, "users")?,
        items,
        completed: column(row, "completed")?,
        last_notification_text: column(row, "last_notification_text")?,
    })
}

fn map_item_row(row: &Row) -> Result<ItemRecord, String> {
    Ok(ItemRecord {
        item_id: column(row, "item_id")?,
        name: column(row, "name")?,
        bought: column(row, "bought")?,
    })
}

fn column<'a, T>(row: &'a Row, name: &str) -> Result<T, String>
where
    T: FromSql<'a>,
{
    row.try_get(name)
        .map_err(|error| format!("{name}: {error}"))
}

fn db_error(error: tokio_postgres::Error) -> StoreError {
    StoreError::Db(error.to_string())
}
