//! Client configuration
//!
//! [`ClientConfig`] is what the provider is built from. It can be assembled
//! directly in code or loaded by [`ConfigLoader`] from overrides, the
//! environment (optionally seeded from a `.env` file) and a TOML file.

mod loader;
mod sources;

use std::time::Duration;

use url::Url;
use z0rath_model::Credential;
use z0rath_model::routes::DEFAULT_BASE_URL;

pub use loader::{ConfigLoadError, ConfigLoader, ConfigLoaderOptions, ConfigOverrides};
pub use sources::{EnvConfig, FileConfig, FileReconnectConfig};

use crate::realtime::ReconnectPolicy;

/// Timeout applied to each REST call unless configured.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything needed to build a [`Provider`](crate::Provider).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Sent as `x-api-key` on every request.
    pub api_key: Credential,
    /// Initially signed-in user, if any.
    pub user: Option<String>,
    /// Versioned REST base, e.g. `https://host/api/v1`
    pub base_url: Url,
    /// Per-request timeout for REST calls.
    pub request_timeout: Duration,
    /// Push channel reconnect behaviour.
    pub reconnect: ReconnectPolicy,
}

impl ClientConfig {
    /// Configuration against the hosted service with default settings.
    pub fn new(api_key: impl Into<Credential>) -> Self {
        Self {
            api_key: api_key.into(),
            user: None,
            base_url: default_base_url(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            reconnect: ReconnectPolicy::default(),
        }
    }

    /// Start signed in as `user`.
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Target another deployment of the service.
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    /// Override the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Override the reconnect policy.
    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }
}

pub(crate) fn default_base_url() -> Url {
    Url::parse(DEFAULT_BASE_URL).expect("default base url is valid")
}
