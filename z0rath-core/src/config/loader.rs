use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::debug;
use url::Url;
use z0rath_model::Credential;

use super::sources::{EnvConfig, FileConfig};
use super::{ClientConfig, DEFAULT_REQUEST_TIMEOUT, default_base_url};
use crate::realtime::ReconnectPolicy;

const DEFAULT_CONFIG_LOCATIONS: [&str; 2] = ["z0rath.toml", "config/z0rath.toml"];

/// Where to look for the config and `.env` files.
#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    /// Explicit TOML file; must exist when set.
    pub config_path: Option<PathBuf>,
    /// `.env` file to load instead of searching for one.
    pub env_file: Option<PathBuf>,
}

/// Values that win over every other source (typically CLI flags).
#[derive(Default, Clone)]
pub struct ConfigOverrides {
    /// API key from the caller.
    pub api_key: Option<Credential>,
    /// User to act as.
    pub user: Option<String>,
    /// REST base URL including the version prefix.
    pub base_url: Option<Url>,
}

impl std::fmt::Debug for ConfigOverrides {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigOverrides")
            .field("api_key", &self.api_key)
            .field("user", &self.user)
            .field("base_url", &self.base_url.as_ref().map(Url::as_str))
            .finish()
    }
}

/// Composes a [`ClientConfig`] from overrides, environment, file and defaults.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
    overrides: ConfigOverrides,
}

impl ConfigLoader {
    /// Loader with no overrides that searches the default locations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loader with the given file locations.
    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self {
            options,
            overrides: ConfigOverrides::default(),
        }
    }

    /// Read this TOML file instead of the default locations.
    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    /// Load this `.env` file instead of searching for one.
    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    /// API key that wins over every other source.
    pub fn with_api_key(mut self, api_key: impl Into<Credential>) -> Self {
        self.overrides.api_key = Some(api_key.into());
        self
    }

    /// User that wins over every other source.
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.overrides.user = Some(user.into());
        self
    }

    /// Base URL that wins over every other source.
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.overrides.base_url = Some(base_url);
        self
    }

    /// Load `.env`, read the process environment and compose.
    pub fn load(&self) -> Result<ClientConfig, ConfigLoadError> {
        let env_file_loaded = load_env_file(self.options.env_file.as_deref())?;
        debug!(env_file_loaded, "environment prepared");

        self.load_with_env(EnvConfig::gather())
    }

    /// Compose from an already gathered environment; never touches the
    /// process environment.
    pub fn load_with_env(&self, env: EnvConfig) -> Result<ClientConfig, ConfigLoadError> {
        let (file_config, config_path) = self.load_file_config(&env)?;
        if let Some(path) = &config_path {
            debug!(path = %path.display(), "loaded configuration file");
        }
        self.compose_config(file_config.unwrap_or_default(), env)
    }

    fn load_file_config(
        &self,
        env: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        // A file named by flag or environment must exist; the default
        // locations are only probed.
        let path = match (&self.options.config_path, &env.config_path) {
            (Some(path), _) | (None, Some(path)) => {
                if !path.exists() {
                    return Err(ConfigLoadError::MissingConfig { path: path.clone() });
                }
                path.clone()
            }
            (None, None) => match DEFAULT_CONFIG_LOCATIONS
                .iter()
                .map(PathBuf::from)
                .find(|candidate| candidate.exists())
            {
                Some(path) => path,
                None => return Ok((None, None)),
            },
        };

        let file_config = read_file_config(&path)?;
        Ok((Some(file_config), Some(path)))
    }

    fn compose_config(
        &self,
        file: FileConfig,
        env: EnvConfig,
    ) -> Result<ClientConfig, ConfigLoadError> {
        let FileConfig {
            api_key: file_api_key,
            user: file_user,
            base_url: file_base_url,
            request_timeout: file_request_timeout,
            reconnect: file_reconnect,
        } = file;

        let api_key = self
            .overrides
            .api_key
            .clone()
            .or_else(|| env.api_key.clone().map(Credential::from))
            .or_else(|| file_api_key.map(Credential::from))
            .filter(|key| !key.is_empty())
            .ok_or(ConfigLoadError::MissingApiKey)?;

        let user = self
            .overrides
            .user
            .clone()
            .or(env.user.clone())
            .or(file_user);

        let base_url = match (&self.overrides.base_url, env.base_url.clone().or(file_base_url)) {
            (Some(url), _) => url.clone(),
            (None, Some(raw)) => Url::parse(&raw)
                .map_err(|source| ConfigLoadError::InvalidBaseUrl { value: raw, source })?,
            (None, None) => default_base_url(),
        };

        let request_timeout = parse_duration(
            "request_timeout",
            env.request_timeout.clone().or(file_request_timeout),
        )?
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        let defaults = ReconnectPolicy::default();
        let reconnect = ReconnectPolicy {
            enabled: env
                .reconnect
                .or(file_reconnect.enabled)
                .unwrap_or(defaults.enabled),
            max_retries: env
                .reconnect_max_retries
                .or(file_reconnect.max_retries)
                .unwrap_or(defaults.max_retries),
            base_delay: parse_duration("reconnect.base_delay", file_reconnect.base_delay)?
                .unwrap_or(defaults.base_delay),
            max_delay: parse_duration("reconnect.max_delay", file_reconnect.max_delay)?
                .unwrap_or(defaults.max_delay),
        };

        Ok(ClientConfig {
            api_key,
            user,
            base_url,
            request_timeout,
            reconnect,
        })
    }
}

/// Load a `.env` file into the process environment. A missing file is
/// not an error; a malformed one is.
fn load_env_file(path: Option<&Path>) -> Result<bool, dotenvy::Error> {
    let loaded = match path {
        Some(path) => dotenvy::from_path(path),
        None => dotenvy::dotenv().map(|_| ()),
    };
    match loaded {
        Ok(()) => Ok(true),
        Err(dotenvy::Error::Io(_)) => Ok(false),
        Err(err) => Err(err),
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigLoadError> {
    let contents = fs::read_to_string(path).map_err(|err| ConfigLoadError::Io {
        path: path.to_path_buf(),
        source: err,
    })?;
    toml::from_str(&contents).map_err(|err| ConfigLoadError::Parse {
        path: path.to_path_buf(),
        source: err,
    })
}

fn parse_duration(
    field: &'static str,
    raw: Option<String>,
) -> Result<Option<Duration>, ConfigLoadError> {
    raw.map(|value| {
        humantime::parse_duration(value.trim())
            .map_err(|source| ConfigLoadError::InvalidDuration { field, value, source })
    })
    .transpose()
}

/// Failures assembling a [`ClientConfig`].
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    /// Explicitly named config file does not exist
    #[error("configuration file missing: {path}")]
    MissingConfig {
        /// Path from the flag or `Z0RATH_CONFIG`
        path: PathBuf,
    },

    /// Config file could not be read
    #[error("failed to read configuration {path}")]
    Io {
        /// File being read
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for [`FileConfig`]
    #[error("failed to parse configuration {path}")]
    Parse {
        /// File being parsed
        path: PathBuf,
        /// TOML decode failure
        #[source]
        source: toml::de::Error,
    },

    /// No source supplied a non-empty API key
    #[error("no api key configured (set Z0RATH_API_KEY or api_key)")]
    MissingApiKey,

    /// Base URL from the environment or file does not parse
    #[error("invalid base url '{value}'")]
    InvalidBaseUrl {
        /// Rejected value
        value: String,
        /// URL parse failure
        #[source]
        source: url::ParseError,
    },

    /// A duration setting is not in humantime format
    #[error("invalid duration '{value}' for {field}")]
    InvalidDuration {
        /// Setting name, e.g. `request_timeout`
        field: &'static str,
        /// Rejected value
        value: String,
        /// Humantime parse failure
        #[source]
        source: humantime::DurationError,
    },

    /// `.env` file exists but could not be parsed
    #[error(transparent)]
    EnvFile(#[from] dotenvy::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env_with_key() -> EnvConfig {
        EnvConfig {
            api_key: Some("env-key".into()),
            ..EnvConfig::default()
        }
    }

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn environment_only_uses_defaults() {
        let config = ConfigLoader::new().load_with_env(env_with_key()).unwrap();

        assert_eq!(config.api_key.expose(), "env-key");
        assert_eq!(config.base_url, default_base_url());
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(config.reconnect, ReconnectPolicy::default());
    }

    #[test]
    fn missing_api_key_is_an_error() {
        let err = ConfigLoader::new()
            .load_with_env(EnvConfig::default())
            .unwrap_err();
        assert!(matches!(err, ConfigLoadError::MissingApiKey));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let err = ConfigLoader::new()
            .with_config_path("/definitely/not/here/z0rath.toml")
            .load_with_env(env_with_key())
            .unwrap_err();
        assert!(matches!(err, ConfigLoadError::MissingConfig { .. }));
    }

    #[test]
    fn env_named_missing_file_is_an_error() {
        let env = EnvConfig {
            config_path: Some("/definitely/not/here/z0rath.toml".into()),
            ..env_with_key()
        };
        let err = ConfigLoader::new().load_with_env(env).unwrap_err();
        assert!(matches!(err, ConfigLoadError::MissingConfig { .. }));
    }

    #[test]
    fn explicit_path_wins_over_env_path() {
        let file = write_config(r#"user = "from-file""#);
        let env = EnvConfig {
            config_path: Some("/definitely/not/here/z0rath.toml".into()),
            ..env_with_key()
        };

        let config = ConfigLoader::new()
            .with_config_path(file.path())
            .load_with_env(env)
            .unwrap();
        assert_eq!(config.user.as_deref(), Some("from-file"));
    }

    #[test]
    fn missing_env_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_env_file(Some(&dir.path().join(".env"))).unwrap();
        assert!(!loaded);
    }

    #[test]
    fn precedence_is_override_then_env_then_file() {
        let file = write_config(
            r#"
            api_key = "file-key"
            user = "file-user"
            base_url = "http://file.test/api/v1"
            request_timeout = "3s"

            [reconnect]
            enabled = true
            max_retries = 4
            base_delay = "250ms"
            "#,
        );
        let env = EnvConfig {
            user: Some("env-user".into()),
            reconnect_max_retries: Some(7),
            ..EnvConfig::default()
        };

        let config = ConfigLoader::new()
            .with_config_path(file.path())
            .with_user("flag-user")
            .load_with_env(env)
            .unwrap();

        assert_eq!(config.api_key.expose(), "file-key");
        assert_eq!(config.user.as_deref(), Some("flag-user"));
        assert_eq!(config.base_url.as_str(), "http://file.test/api/v1");
        assert_eq!(config.request_timeout, Duration::from_secs(3));
        assert!(config.reconnect.enabled);
        assert_eq!(config.reconnect.max_retries, 7);
        assert_eq!(config.reconnect.base_delay, Duration::from_millis(250));
        assert_eq!(config.reconnect.max_delay, ReconnectPolicy::default().max_delay);
    }

    #[test]
    fn invalid_values_are_reported() {
        let env = EnvConfig {
            base_url: Some("not a url".into()),
            ..env_with_key()
        };
        let err = ConfigLoader::new().load_with_env(env).unwrap_err();
        assert!(matches!(err, ConfigLoadError::InvalidBaseUrl { .. }));

        let env = EnvConfig {
            request_timeout: Some("soon".into()),
            ..env_with_key()
        };
        let err = ConfigLoader::new().load_with_env(env).unwrap_err();
        assert!(matches!(
            err,
            ConfigLoadError::InvalidDuration { field: "request_timeout", .. }
        ));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let file = write_config("api_key = ");
        let err = ConfigLoader::new()
            .with_config_path(file.path())
            .load_with_env(env_with_key())
            .unwrap_err();
        assert!(matches!(err, ConfigLoadError::Parse { .. }));
    }
}
