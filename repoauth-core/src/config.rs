use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::models::{OAuthProvider, ProviderConfig, ProviderEndpoints, DEFAULT_STATE_TTL_SECS};
use crate::oauth2::http::{HttpClientConfig, DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_USER_AGENT};
use crate::service::state::DEFAULT_STATE_LENGTH;

/// Application configuration consumed by this crate
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub oauth: OAuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

/// `OAuth` flow settings and per-provider credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    /// Lifetime of an issued CSRF state token
    pub state_ttl_seconds: u64,
    /// Random bytes per state token
    pub state_length: usize,
    /// Timeout of each request to an identity provider
    pub http_timeout_seconds: u64,
    pub user_agent: String,
    /// Period of the background expired-state sweep
    pub sweep_interval_seconds: u64,
    pub github: Option<ProviderSettings>,
    pub gitlab: Option<ProviderSettings>,
    pub bitbucket: Option<ProviderSettings>,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            state_ttl_seconds: DEFAULT_STATE_TTL_SECS.unsigned_abs(),
            state_length: DEFAULT_STATE_LENGTH,
            http_timeout_seconds: DEFAULT_HTTP_TIMEOUT_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            sweep_interval_seconds: 60,
            github: None,
            gitlab: None,
            bitbucket: None,
        }
    }
}

impl OAuthConfig {
    #[must_use]
    pub fn state_ttl(&self) -> chrono::Duration {
        i64::try_from(self.state_ttl_seconds)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or_else(|| chrono::Duration::seconds(DEFAULT_STATE_TTL_SECS))
    }

    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }

    #[must_use]
    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: Duration::from_secs(self.http_timeout_seconds),
            user_agent: self.user_agent.clone(),
        }
    }

    /// Settings section of `provider`, if configured
    #[must_use]
    pub const fn provider_settings(&self, provider: OAuthProvider) -> Option<&ProviderSettings> {
        match provider {
            OAuthProvider::GitHub => self.github.as_ref(),
            OAuthProvider::GitLab => self.gitlab.as_ref(),
            OAuthProvider::Bitbucket => self.bitbucket.as_ref(),
        }
    }
}

const fn default_enabled() -> bool {
    true
}

/// Configuration section of one identity provider
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Root of a self-hosted instance; individual endpoint overrides win over it
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub authorize_url: Option<String>,
    #[serde(default)]
    pub token_url: Option<String>,
    #[serde(default)]
    pub revoke_url: Option<String>,
    #[serde(default)]
    pub api_base_url: Option<String>,
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("enabled", &self.enabled)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ProviderSettings {
    #[must_use]
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            enabled: true,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: None,
            scopes: Vec::new(),
            base_url: None,
            authorize_url: None,
            token_url: None,
            revoke_url: None,
            api_base_url: None,
        }
    }

    /// Resolve into a validated [`ProviderConfig`]
    ///
    /// # Errors
    /// `Error::Configuration` for blank credentials or malformed URLs.
    pub fn to_provider_config(&self, provider: OAuthProvider) -> crate::Result<ProviderConfig> {
        let mut endpoints = self.base_url.as_deref().map_or_else(
            || ProviderEndpoints::for_provider(provider),
            |base| ProviderEndpoints::with_base_url(provider, base),
        );
        if let Some(url) = &self.authorize_url {
            endpoints.authorize_url.clone_from(url);
        }
        if let Some(url) = &self.token_url {
            endpoints.token_url.clone_from(url);
        }
        if let Some(url) = &self.revoke_url {
            endpoints.revoke_url.clone_from(url);
        }
        if let Some(url) = &self.api_base_url {
            endpoints.api_base_url.clone_from(url);
        }

        let mut config = ProviderConfig::new(provider, self.client_id.clone(), self.client_secret.clone())?
            .with_scopes(self.scopes.clone())
            .with_endpoints(endpoints);
        if let Some(redirect_uri) = &self.redirect_uri {
            config = config.with_redirect_uri(redirect_uri.clone());
        }
        config.validate()?;
        Ok(config)
    }
}

impl Config {
    /// Load configuration with the following priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Default values (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        // Load config file if provided
        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // Override with environment variables (REPOAUTH_OAUTH__GITHUB__CLIENT_ID, etc.)
        builder = builder.add_source(
            Environment::with_prefix("REPOAUTH")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }
}
