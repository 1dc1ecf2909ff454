use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tokio_postgres::{Client, NoTls};

const SCHEMA_SQL: &str = include_str!("../migrations/0001_shopping_schema.sql");

#[derive(Clone)]
pub struct ShoppingDb {
    client: Arc<Mutex<Client>>,
}

impl ShoppingDb {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let (client, connection) = tokio_postgres::connect(database_url, NoTls)
            .await
            .context("connect to postgres")?;

        tokio::spawn(async move {
            if let Err(error) = connection.await {
                tracing::error!(reason = %error, "shopping postgres connection error");
            }
        });

        Ok(Self {
            client: Arc::new(Mutex::new(client)),
        })
    }

    pub fn client(&self) -> Arc<Mutex<Client>> {
        self.client.clone()
    }

    /// Applies the schema. Every statement is idempotent.
    pub async fn migrate(&self) -> Result<()> {
        let client = self.client.lock().await;
        client
            .batch_execute(SCHEMA_SQL)
            .await
            .context("apply shopping schema")?;
        tracing::info!("shopping schema applied");
        Ok(())
    }
}
