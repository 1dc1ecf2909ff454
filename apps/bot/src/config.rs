use std::env;

pub use shopping_logging::LogFormat;
use shopping_logging::LOG_FORMAT_ENV;
use thiserror::Error;

pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8001";
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 10_000;
const MIN_HTTP_TIMEOUT_MS: u64 = 250;
const MAX_HTTP_TIMEOUT_MS: u64 = 120_000;

#[derive(Clone, Debug)]
pub struct BotConfig {
    pub bot_token: String,
    pub backend_url: String,
    pub http_timeout_ms: u64,
    pub log_format: LogFormat,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BotConfigError {
    #[error("BOT_TOKEN is not set")]
    MissingToken,
    #[error("invalid SHOPPING_BOT_HTTP_TIMEOUT_MS: {0}")]
    InvalidTimeout(String),
    #[error("invalid SHOPPING_LOG_FORMAT: {0}")]
    InvalidLogFormat(String),
}

impl BotConfig {
    pub fn from_env() -> Result<Self, BotConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, BotConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let bot_token = read("BOT_TOKEN").ok_or(BotConfigError::MissingToken)?;
        let backend_url = read("BACKEND_URL").unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());
        let http_timeout_ms = match read("SHOPPING_BOT_HTTP_TIMEOUT_MS") {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|_| BotConfigError::InvalidTimeout(raw))?
                .clamp(MIN_HTTP_TIMEOUT_MS, MAX_HTTP_TIMEOUT_MS),
            None => DEFAULT_HTTP_TIMEOUT_MS,
        };
        let log_format = LogFormat::parse(read(LOG_FORMAT_ENV).as_deref().unwrap_or_default())
            .map_err(BotConfigError::InvalidLogFormat)?;

        Ok(Self {
            bot_token,
            backend_url,
            http_timeout_ms,
            log_format,
        })
    }
}
