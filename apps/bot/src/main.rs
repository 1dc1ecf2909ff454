use anyhow::{Context, Result};
use shopping_bot::config::BotConfig;
use shopping_logging::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = BotConfig::from_env().context("load shopping bot config")?;
    init_tracing(config.log_format);
    shopping_bot::run(config).await
}
