//! Client configuration loaded from environment variables.
//!
//! All settings have defaults pointing at a local development backend, so the
//! client starts with zero configuration.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};

use vhub_net::PushConfig;
use vhub_shared::constants::{
    DEFAULT_API_URL, DEFAULT_RECONNECT_DELAY_MAX_MS, DEFAULT_RECONNECT_DELAY_MS,
};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// REST API base URL.
    /// Env: `VHUB_API_URL`
    /// Default: `http://localhost:5000/api`
    pub api_url: String,

    /// Push server origin.
    /// Env: `VHUB_SOCKET_URL`
    /// Default: the API URL without its `/api` suffix.
    pub socket_url: String,

    /// Directory of the local store.
    /// Env: `VHUB_DATA_DIR`
    /// Default: `None` (platform data directory).
    pub data_dir: Option<PathBuf>,

    /// Drop pushed messages sent by the current user. The reply response is
    /// already appended, so an echo would otherwise show up a second time.
    /// Env: `VHUB_FILTER_SELF_ECHO` (true/false)
    /// Default: `true`
    pub filter_self_echo: bool,

    /// Offset used to group messages by calendar date, in minutes east of UTC.
    /// Env: `VHUB_UTC_OFFSET_MINUTES`
    /// Default: `0`
    pub utc_offset_minutes: i32,

    /// Env: `VHUB_RECONNECT_DELAY_MS`
    /// Default: `1000`
    pub reconnect_delay: Duration,

    /// Env: `VHUB_RECONNECT_DELAY_MAX_MS`
    /// Default: `5000`
    pub reconnect_delay_max: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            socket_url: socket_origin(DEFAULT_API_URL),
            data_dir: None,
            filter_self_echo: true,
            utc_offset_minutes: 0,
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            reconnect_delay_max: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MAX_MS),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = get("VHUB_API_URL") {
            config.socket_url = socket_origin(&url);
            config.api_url = url;
        }

        if let Some(url) = get("VHUB_SOCKET_URL") {
            config.socket_url = url;
        }

        if let Some(dir) = get("VHUB_DATA_DIR") {
            if !dir.is_empty() {
                config.data_dir = Some(PathBuf::from(dir));
            }
        }

        if let Some(val) = get("VHUB_FILTER_SELF_ECHO") {
            config.filter_self_echo = val != "false" && val != "0";
        }

        if let Some(val) = get("VHUB_UTC_OFFSET_MINUTES") {
            match val.parse::<i32>() {
                Ok(minutes) if minutes.checked_mul(60).and_then(FixedOffset::east_opt).is_some() => {
                    config.utc_offset_minutes = minutes;
                }
                _ => tracing::warn!(value = %val, "Invalid VHUB_UTC_OFFSET_MINUTES, using default"),
            }
        }

        if let Some(val) = get("VHUB_RECONNECT_DELAY_MS") {
            match val.parse::<u64>() {
                Ok(ms) => config.reconnect_delay = Duration::from_millis(ms),
                Err(_) => tracing::warn!(value = %val, "Invalid VHUB_RECONNECT_DELAY_MS, using default"),
            }
        }

        if let Some(val) = get("VHUB_RECONNECT_DELAY_MAX_MS") {
            match val.parse::<u64>() {
                Ok(ms) => config.reconnect_delay_max = Duration::from_millis(ms),
                Err(_) => tracing::warn!(value = %val, "Invalid VHUB_RECONNECT_DELAY_MAX_MS, using default"),
            }
        }

        if config.reconnect_delay_max < config.reconnect_delay {
            config.reconnect_delay_max = config.reconnect_delay;
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }

    /// Offset for date grouping. Always valid after loading.
    pub fn utc_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60))
            .unwrap_or_else(|| Utc.fix())
    }

    pub fn push_config(&self, auth_token: Option<String>) -> PushConfig {
        PushConfig {
            socket_url: self.socket_url.clone(),
            auth_token,
            reconnect_delay: self.reconnect_delay,
            reconnect_delay_max: self.reconnect_delay_max,
        }
    }
}

/// `https://host/api` -> `https://host`
fn socket_origin(api_url: &str) -> String {
    let trimmed = api_url.trim_end_matches('/');
    trimmed
        .strip_suffix("/api")
        .unwrap_or(trimmed)
        .to_string()
}
