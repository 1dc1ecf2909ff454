use std::{
    env,
    net::{AddrParseError, SocketAddr},
};

pub use shopping_logging::LogFormat;
use shopping_logging::LOG_FORMAT_ENV;
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct Config {
    pub service_name: String,
    pub bind_addr: SocketAddr,
    pub build_sha: String,
    pub db_url: Option<String>,
    pub log_format: LogFormat,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid SHOPPING_BACKEND_BIND_ADDR: {0}")]
    BindAddrParse(#[from] AddrParseError),
    #[error("invalid SHOPPING_LOG_FORMAT: {0}")]
    InvalidLogFormat(String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_addr = env::var("SHOPPING_BACKEND_BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8001".to_string())
            .parse()?;
        let service_name = env::var("SHOPPING_BACKEND_SERVICE_NAME")
            .unwrap_or_else(|_| "shopping-backend".to_string());
        let build_sha = env::var("SHOPPING_BACKEND_BUILD_SHA").unwrap_or_else(|_| "dev".to_string());
        let db_url = env::var("DB_URL")
            .or_else(|_| env::var("DATABASE_URL"))
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        let log_format = LogFormat::parse(
            env::var(LOG_FORMAT_ENV)
                .unwrap_or_default()
                .as_str(),
        )
        .map_err(ConfigError::InvalidLogFormat)?;

        Ok(Self {
            service_name,
            bind_addr,
            build_sha,
            db_url,
            log_format,
        })
    }

    #[must_use]
    pub fn for_tests() -> Self {
        Self {
            service_name: "shopping-backend-test".to_string(),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            build_sha: "test".to_string(),
            db_url: None,
            log_format: LogFormat::Text,
        }
    }

    #[must_use]
    pub fn store_driver(&self) -> &'static str {
        if self.db_url.is_some() {
            "postgres"
        } else {
            "memory"
        }
    }
}
