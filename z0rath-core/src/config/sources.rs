use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Raw configuration as defined in a TOML file.
#[derive(Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    /// API key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Initially signed-in user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// REST base URL including the version prefix.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Humantime duration, e.g. `"10s"`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<String>,
    /// `[reconnect]` table.
    #[serde(default)]
    pub reconnect: FileReconnectConfig,
}

/// `[reconnect]` table of the TOML file.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileReconnectConfig {
    /// Turn automatic reconnects on or off.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Retries before giving up.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    /// Humantime delay before the first retry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_delay: Option<String>,
    /// Humantime upper bound on the retry delay.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_delay: Option<String>,
}

/// Environment-derived configuration values.
#[derive(Default, Clone)]
pub struct EnvConfig {
    /// `Z0RATH_API_KEY`
    pub api_key: Option<String>,
    /// `Z0RATH_USER`
    pub user: Option<String>,
    /// `Z0RATH_BASE_URL`
    pub base_url: Option<String>,
    /// `Z0RATH_REQUEST_TIMEOUT`, humantime
    pub request_timeout: Option<String>,
    /// `Z0RATH_RECONNECT`
    pub reconnect: Option<bool>,
    /// `Z0RATH_RECONNECT_MAX_RETRIES`
    pub reconnect_max_retries: Option<u32>,
    /// `Z0RATH_CONFIG`
    pub config_path: Option<PathBuf>,
}

impl EnvConfig {
    /// Read the process environment.
    pub fn gather() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        Self {
            api_key: var("Z0RATH_API_KEY"),
            user: var("Z0RATH_USER"),
            base_url: var("Z0RATH_BASE_URL"),
            request_timeout: var("Z0RATH_REQUEST_TIMEOUT"),
            reconnect: var("Z0RATH_RECONNECT").and_then(|raw| parse_bool(&raw)),
            reconnect_max_retries: var("Z0RATH_RECONNECT_MAX_RETRIES")
                .and_then(|raw| raw.trim().parse().ok()),
            config_path: var("Z0RATH_CONFIG").map(PathBuf::from),
        }
    }
}

impl fmt::Debug for FileConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("user", &self.user)
            .field("base_url", &self.base_url)
            .field("request_timeout", &self.request_timeout)
            .field("reconnect", &self.reconnect)
            .finish()
    }
}

impl fmt::Debug for EnvConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("user", &self.user)
            .field("base_url", &self.base_url)
            .field("request_timeout", &self.request_timeout)
            .field("reconnect", &self.reconnect)
            .field("reconnect_max_retries", &self.reconnect_max_retries)
            .field("config_path", &self.config_path)
            .finish()
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
