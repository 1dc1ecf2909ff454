use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shopping_backend_service::config::Config;
use shopping_logging::init_tracing;

#[derive(Parser, Debug)]
#[command(name = "shopping-backend", about = "Shared shopping list backend")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API (default).
    Serve,
    /// Apply the postgres schema and exit.
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env().context("load shopping backend config")?;
    init_tracing(config.log_format);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => shopping_backend_service::serve(config).await,
        Command::Migrate => shopping_backend_service::migrate(&config).await,
    }
}
