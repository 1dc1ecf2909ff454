//! Tracing setup shared by the shopping binaries.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable both binaries read their log format from.
pub const LOG_FORMAT_ENV: &str = "SHOPPING_LOG_FORMAT";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    /// Case-insensitive; blank means text. Returns the rejected value on error.
    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(other.to_string()),
        }
    }
}

/// Installs the global subscriber. `RUST_LOG` wins over the `info` default.
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}
