#![forbid(unsafe_code)]

use std::sync::Arc;

use anyhow::{Result, bail};
use tokio::net::TcpListener;
use tracing::info;

use crate::{
    config::Config,
    db::ShoppingDb,
    server::{AppState, build_router},
    service::ListService,
};

pub mod config;
pub mod db;
pub mod server;
pub mod service;
pub mod store;

pub async fn build_state(config: Config) -> Result<AppState> {
    let store = match config.db_url.as_deref() {
        Some(url) => store::postgres(Arc::new(ShoppingDb::connect(url).await?)),
        None => store::memory(),
    };
    info!(store_driver = config.store_driver(), "shopping store ready");
    Ok(AppState::new(config, ListService::new(store)))
}

pub async fn build_app(config: Config) -> Result<axum::Router> {
    Ok(build_router(build_state(config).await?))
}

pub async fn serve(config: Config) -> Result<()> {
    let listener = TcpListener::bind(config.bind_addr).await?;
    info!(
        service = %config.service_name,
        bind_addr = %config.bind_addr,
        "shopping backend listening"
    );
    axum::serve(listener, build_app(config).await?).await?;
    Ok(())
}

pub async fn migrate(config: &Config) -> Result<()> {
    let Some(url) = config.db_url.as_deref() else {
        bail!("DB_URL or DATABASE_URL must be set to run migrations");
    };
    ShoppingDb::connect(url).await?.migrate().await
}
