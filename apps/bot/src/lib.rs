#![forbid(unsafe_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use shopping_client::{ShoppingClient, ShoppingClientConfig};
use teloxide::prelude::*;
use tracing::info;

use crate::{
    actions::BotActions, config::BotConfig, sort_prefs::InMemorySortPreferences,
    transport::TelegramTransport,
};

pub mod actions;
pub mod backend;
pub mod callback;
pub mod config;
pub mod delivery;
pub mod fanout;
pub mod handlers;
pub mod presenter;
pub mod render;
pub mod sort_prefs;
#[cfg(test)]
mod testing;
pub mod transport;

pub fn build_actions(config: &BotConfig, bot: Bot) -> Result<BotActions> {
    let client = ShoppingClient::new(ShoppingClientConfig {
        base_url: config.backend_url.clone(),
        timeout_ms: config.http_timeout_ms,
    })
    .context("build shopping backend client")?;
    Ok(BotActions::new(
        Arc::new(client),
        Arc::new(TelegramTransport::new(bot)),
        Arc::new(InMemorySortPreferences::default()),
    ))
}

pub async fn run(config: BotConfig) -> Result<()> {
    let bot = Bot::new(config.bot_token.clone());
    let actions = Arc::new(build_actions(&config, bot.clone())?);
    info!(backend_url = %config.backend_url, "shopping bot polling for updates");

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handlers::handle_message))
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![actions])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("shopping bot stopped");
    Ok(())
}
