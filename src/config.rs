//! Configuration loader and client settings.

use crate::errors::{AppError, Result};
use url::Url;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_PATH: &str = "/price";
pub const DEFAULT_TARGET_ID: &str = "price";

/// Settings for a single price display session.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket endpoint of the price stream (`ws://` or `wss://`).
    pub endpoint: Url,
    /// Id of the display target the price is rendered into.
    pub target_id: String,
}

impl ClientConfig {
    /// Load configuration from the process environment.
    ///
    /// `PRICE_WS_URL` wins over the individual `PRICE_WS_HOST`, `PRICE_WS_PORT`
    /// and `PRICE_WS_PATH` parts.
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let endpoint = match lookup("PRICE_WS_URL").filter(|v| !v.trim().is_empty()) {
            Some(raw) => Url::parse(raw.trim())?,
            None => {
                let host = lookup("PRICE_WS_HOST").unwrap_or_else(|| DEFAULT_HOST.into());
                let port = match lookup("PRICE_WS_PORT") {
                    Some(raw) => raw.trim().parse::<u16>().map_err(|e| {
                        AppError::Config(format!("PRICE_WS_PORT '{raw}' is not a valid port: {e}"))
                    })?,
                    None => DEFAULT_PORT,
                };
                let path = lookup("PRICE_WS_PATH").unwrap_or_else(|| DEFAULT_PATH.into());
                let path = path.trim_start_matches('/');
                Url::parse(&format!("ws://{}:{}/{}", host.trim(), port, path))?
            }
        };

        match endpoint.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(AppError::Config(format!(
                    "endpoint scheme must be ws or wss, got '{other}'"
                )));
            }
        }

        let target_id = lookup("PRICE_TARGET_ID")
            .map(|id| id.trim().trim_start_matches('#').to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| DEFAULT_TARGET_ID.into());

        Ok(Self {
            endpoint,
            target_id,
        })
    }
}
