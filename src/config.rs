use dotenvy::dotenv;
use std::{env, net::SocketAddr, path::PathBuf, str::FromStr};

use crate::errors::ConfigError;
use crate::upload::normalize_prefix;

const DEFAULT_MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Bearer token for the document routes. `None` leaves them open.
    pub auth_token: Option<String>,
    pub upload_dir: PathBuf,
    pub public_prefix: String,
    pub max_body_bytes: usize,
    pub host: String,
    pub port: u16,
    pub log_level: tracing::Level,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let public_prefix = var("UPLOAD_PUBLIC_PREFIX").unwrap_or_else(|| "/uploads".to_string());
        let log_level = match var("LOG_LEVEL") {
            Some(level) => {
                tracing::Level::from_str(&level).map_err(|_| ConfigError::InvalidLogLevel(level))?
            }
            None => tracing::Level::INFO,
        };

        Ok(Self {
            auth_token: var("AUTH_TOKEN"),
            upload_dir: PathBuf::from(
                var("UPLOAD_DIR").unwrap_or_else(|| "public/uploads".to_string()),
            ),
            public_prefix: normalize_prefix(&public_prefix),
            max_body_bytes: parse_number("MAX_BODY_BYTES", var("MAX_BODY_BYTES"))?
                .unwrap_or(DEFAULT_MAX_BODY_BYTES),
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_number("PORT", var("PORT"))?.unwrap_or(8080),
            log_level,
        })
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse().map_err(|_| ConfigError::InvalidAddress(addr))
    }
}

fn parse_number<T: FromStr>(name: &'static str, value: Option<String>) -> Result<Option<T>, ConfigError> {
    value
        .map(|v| v.trim().parse().map_err(|_| ConfigError::InvalidNumber { name, value: v }))
        .transpose()
}
