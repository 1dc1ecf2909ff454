use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::{
    backend::ListBackend,
    delivery::{DeliveryTarget, deliver},
    render::{ListView, OwnerName, ViewInput, render_list_view},
    sort_prefs::SortPreferences,
    transport::ChatTransport,
};

/// Which banner line a refresh shows above the items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Banner<'a> {
    /// The banner stored on the list, if any.
    Stored,
    /// A transient text; the stored banner is cleared once it is shown.
    Explicit(&'a str),
    Hidden,
}

#[derive(Debug, Clone, Copy)]
pub struct RefreshRequest<'a> {
    pub chat_id: i64,
    pub user_id: i64,
    pub list_id: &'a str,
    /// Falls back to the viewer's stored page.
    pub page: Option<u32>,
    pub banner: Banner<'a>,
}

#[derive(Clone)]
pub struct ListPresenter {
    backend: Arc<dyn ListBackend>,
    transport: Arc<dyn ChatTransport>,
    sort: Arc<dyn SortPreferences>,
}

impl ListPresenter {
    pub fn new(
        backend: Arc<dyn ListBackend>,
        transport: Arc<dyn ChatTransport>,
        sort: Arc<dyn SortPreferences>,
    ) -> Self {
        Self {
            backend,
            transport,
            sort,
        }
    }

    /// Renders the list for one viewer and brings their chat message up to
    /// date. Returns `None` when the list no longer exists.
    pub async fn refresh(&self, request: RefreshRequest<'_>) -> Result<Option<ListView>> {
        let RefreshRequest {
            chat_id,
            user_id,
            list_id,
            page,
            banner,
        } = request;

        let requested_page = match page {
            Some(page) => page,
            None => self
                .backend
                .current_page(user_id, list_id)
                .await
                .unwrap_or_else(|error| {
                    warn!(user_id, list_id, reason = %error, "failed to load current page");
                    1
                }),
        };

        let Some(list) = self
            .backend
            .list(list_id)
            .await
            .context("failed to load list")?
        else {
            debug!(list_id, user_id, "list to render no longer exists");
            return Ok(None);
        };

        let owner = self.owner_name(list.owner_id).await;
        let sorted = self.sort.is_sorted(list_id).await;
        let skip_confirm = self
            .backend
            .skip_confirm(user_id, list_id)
            .await
            .unwrap_or_else(|error| {
                warn!(user_id, list_id, reason = %error, "failed to load skip_confirm");
                false
            });
        let banner_text = match banner {
            Banner::Stored => list.last_notification_text.as_deref(),
            Banner::Explicit(text) => Some(text),
            Banner::Hidden => None,
        };

        let view = render_list_view(&ViewInput {
            list: &list,
            viewer_id: user_id,
            requested_page,
            sorted,
            owner: &owner,
            banner: banner_text,
            skip_confirm,
        });

        deliver(
            self.backend.as_ref(),
            self.transport.as_ref(),
            &DeliveryTarget {
                chat_id,
                user_id,
                list_id,
            },
            &view,
        )
        .await?;

        if matches!(banner, Banner::Explicit(_))
            && let Err(error) = self.backend.clear_notification(list_id).await
        {
            warn!(list_id, reason = %error, "failed to clear list banner");
        }
        if let Err(error) = self
            .backend
            .set_current_page(user_id, list_id, view.page)
            .await
        {
            warn!(user_id, list_id, reason = %error, "failed to store current page");
        }

        Ok(Some(view))
    }

    async fn owner_name(&self, owner_id: i64) -> OwnerName {
        match self.backend.user(owner_id).await {
            Ok(Some(owner)) => match owner.username.filter(|name| !name.trim().is_empty()) {
                Some(username) => OwnerName::Username(username),
                None => OwnerName::Unnamed(owner_id),
            },
            Ok(None) => OwnerName::Unknown,
            Err(error) => {
                warn!(owner_id, reason = %error, "failed to look up list owner");
                OwnerName::Unknown
            }
        }
    }
}
