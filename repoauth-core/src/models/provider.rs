//! OAuth2 identity provider identifiers and configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Supported identity provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    /// GitHub (classic OAuth apps)
    GitHub,
    /// GitLab.com or a self-hosted GitLab
    GitLab,
    /// Bitbucket Cloud
    Bitbucket,
}

impl OAuthProvider {
    pub const ALL: [Self; 3] = [Self::GitHub, Self::GitLab, Self::Bitbucket];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::GitHub => "github",
            Self::GitLab => "gitlab",
            Self::Bitbucket => "bitbucket",
        }
    }

    /// Human-readable name used in error messages
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::GitHub => "GitHub",
            Self::GitLab => "GitLab",
            Self::Bitbucket => "Bitbucket",
        }
    }

    /// Case-insensitive lookup
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "github" => Some(Self::GitHub),
            "gitlab" => Some(Self::GitLab),
            "bitbucket" => Some(Self::Bitbucket),
            _ => None,
        }
    }

    /// Scopes requested when the caller passes none
    #[must_use]
    pub fn default_scopes(&self) -> Vec<String> {
        match self {
            Self::GitHub => vec!["user:email".to_string(), "read:user".to_string()],
            Self::GitLab => vec!["read_user".to_string()],
            Self::Bitbucket => vec!["account".to_string()],
        }
    }

    /// Scope needed to list the account's email addresses
    #[must_use]
    pub const fn email_scope(&self) -> &'static str {
        match self {
            Self::GitHub => "user:email",
            Self::GitLab => "read_user",
            Self::Bitbucket => "email",
        }
    }

    /// GitHub classic OAuth apps never issue refresh tokens
    #[must_use]
    pub const fn supports_refresh(&self) -> bool {
        !matches!(self, Self::GitHub)
    }
}

impl fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OAuthProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| Error::ProviderNotFound(s.to_string()))
    }
}

/// Endpoint URLs of one identity provider
///
/// Defaults point at the public SaaS instances. Overriding them is how
/// self-hosted installations (and tests) are targeted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEndpoints {
    pub authorize_url: String,
    pub token_url: String,
    /// May contain a `{client_id}` placeholder (GitHub)
    pub revoke_url: String,
    pub api_base_url: String,
}

impl ProviderEndpoints {
    #[must_use]
    pub fn for_provider(provider: OAuthProvider) -> Self {
        match provider {
            OAuthProvider::GitHub => Self {
                authorize_url: "https://github.com/login/oauth/authorize".to_string(),
                token_url: "https://github.com/login/oauth/access_token".to_string(),
                revoke_url: "https://api.github.com/applications/{client_id}/token".to_string(),
                api_base_url: "https://api.github.com".to_string(),
            },
            OAuthProvider::GitLab => Self {
                authorize_url: "https://gitlab.com/oauth/authorize".to_string(),
                token_url: "https://gitlab.com/oauth/token".to_string(),
                revoke_url: "https://gitlab.com/oauth/revoke".to_string(),
                api_base_url: "https://gitlab.com/api/v4".to_string(),
            },
            OAuthProvider::Bitbucket => Self {
                authorize_url: "https://bitbucket.org/site/oauth2/authorize".to_string(),
                token_url: "https://bitbucket.org/site/oauth2/access_token".to_string(),
                revoke_url: "https://bitbucket.org/site/oauth2/revoke".to_string(),
                api_base_url: "https://api.bitbucket.org/2.0".to_string(),
            },
        }
    }

    /// Point every endpoint at `base`, keeping each provider's path layout.
    ///
    /// Used for self-hosted GitLab and for mock servers.
    #[must_use]
    pub fn with_base_url(provider: OAuthProvider, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        match provider {
            OAuthProvider::GitHub => Self {
                authorize_url: format!("{base}/login/oauth/authorize"),
                token_url: format!("{base}/login/oauth/access_token"),
                revoke_url: format!("{base}/applications/{{client_id}}/token"),
                api_base_url: base.to_string(),
            },
            OAuthProvider::GitLab => Self {
                authorize_url: format!("{base}/oauth/authorize"),
                token_url: format!("{base}/oauth/token"),
                revoke_url: format!("{base}/oauth/revoke"),
                api_base_url: format!("{base}/api/v4"),
            },
            OAuthProvider::Bitbucket => Self {
                authorize_url: format!("{base}/site/oauth2/authorize"),
                token_url: format!("{base}/site/oauth2/access_token"),
                revoke_url: format!("{base}/site/oauth2/revoke"),
                api_base_url: format!("{base}/2.0"),
            },
        }
    }

    pub(crate) fn api_url(&self, path: &str) -> String {
        format!("{}{path}", self.api_base_url.trim_end_matches('/'))
    }

    pub(crate) fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("authorize_url", &self.authorize_url),
            ("token_url", &self.token_url),
            ("revoke_url", &self.revoke_url),
            ("api_base_url", &self.api_base_url),
        ] {
            url::Url::parse(value)
                .map_err(|e| Error::Configuration(format!("Invalid {name} '{value}': {e}")))?;
        }
        Ok(())
    }
}

/// Credentials and endpoints for one provider
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub provider: OAuthProvider,
    pub client_id: String,
    pub client_secret: String,
    /// Default scopes; the provider's own defaults apply when empty
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Default callback URL registered with the IdP
    #[serde(default)]
    pub redirect_uri: Option<String>,
    pub endpoints: ProviderEndpoints,
}

impl ProviderConfig {
    /// Create a validated configuration using the provider's public endpoints
    ///
    /// # Errors
    /// Returns `Error::Configuration` if `client_id` or `client_secret` is blank.
    pub fn new(
        provider: OAuthProvider,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Result<Self> {
        let config = Self {
            provider,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scopes: Vec::new(),
            redirect_uri: None,
            endpoints: ProviderEndpoints::for_provider(provider),
        };
        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    #[must_use]
    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(redirect_uri.into());
        self
    }

    #[must_use]
    pub fn with_endpoints(mut self, endpoints: ProviderEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Check credentials and endpoint URLs
    ///
    /// # Errors
    /// Returns `Error::Configuration` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(Error::Configuration(format!(
                "{} client_id must not be empty",
                self.provider.display_name()
            )));
        }
        if self.client_secret.trim().is_empty() {
            return Err(Error::Configuration(format!(
                "{} client_secret must not be empty",
                self.provider.display_name()
            )));
        }
        self.endpoints.validate()
    }

    /// Configured scopes, or the provider defaults
    #[must_use]
    pub fn effective_scopes(&self) -> Vec<String> {
        if self.scopes.is_empty() {
            self.provider.default_scopes()
        } else {
            self.scopes.clone()
        }
    }

    /// Caller-facing view without the client secret
    #[must_use]
    pub fn public(&self) -> PublicProviderConfig {
        PublicProviderConfig {
            provider: self.provider,
            client_id: self.client_id.clone(),
            scopes: self.effective_scopes(),
            redirect_uri: self.redirect_uri.clone(),
            authorize_url: self.endpoints.authorize_url.clone(),
            supports_refresh: self.provider.supports_refresh(),
        }
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider", &self.provider)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("scopes", &self.scopes)
            .field("redirect_uri", &self.redirect_uri)
            .field("endpoints", &self.endpoints)
            .finish()
    }
}

/// Provider configuration safe to hand to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicProviderConfig {
    pub provider: OAuthProvider,
    pub client_id: String,
    pub scopes: Vec<String>,
    pub redirect_uri: Option<String>,
    pub authorize_url: String,
    pub supports_refresh: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(OAuthProvider::parse("GitHub"), Some(OAuthProvider::GitHub));
        assert_eq!(OAuthProvider::parse("GITLAB"), Some(OAuthProvider::GitLab));
        assert_eq!(OAuthProvider::parse(" bitbucket "), Some(OAuthProvider::Bitbucket));
        assert_eq!(OAuthProvider::parse("gitea"), None);
        assert!(matches!(
            "unknown".parse::<OAuthProvider>(),
            Err(Error::ProviderNotFound(_))
        ));
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&OAuthProvider::GitLab).unwrap();
        assert_eq!(json, "\"gitlab\"");
        let parsed: OAuthProvider = serde_json::from_str("\"bitbucket\"").unwrap();
        assert_eq!(parsed, OAuthProvider::Bitbucket);
    }

    #[test]
    fn test_config_rejects_blank_credentials() {
        assert!(matches!(
            ProviderConfig::new(OAuthProvider::GitLab, "", "secret"),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            ProviderConfig::new(OAuthProvider::GitHub, "id", "   "),
            Err(Error::Configuration(_))
        ));
        assert!(ProviderConfig::new(OAuthProvider::Bitbucket, "id", "secret").is_ok());
    }

    #[test]
    fn test_config_rejects_malformed_endpoint() {
        let mut endpoints = ProviderEndpoints::for_provider(OAuthProvider::GitLab);
        endpoints.token_url = "not a url".to_string();
        let config = ProviderConfig::new(OAuthProvider::GitLab, "id", "secret")
            .unwrap()
            .with_endpoints(endpoints);
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_effective_scopes_default() {
        let config = ProviderConfig::new(OAuthProvider::GitHub, "id", "secret").unwrap();
        assert_eq!(config.effective_scopes(), vec!["user:email", "read:user"]);

        let config = config.with_scopes(vec!["repo".to_string()]);
        assert_eq!(config.effective_scopes(), vec!["repo"]);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = ProviderConfig::new(OAuthProvider::GitHub, "id", "super-secret").unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_public_config_hides_secret() {
        let public = ProviderConfig::new(OAuthProvider::Bitbucket, "id", "secret")
            .unwrap()
            .with_redirect_uri("https://app.example.com/callback")
            .public();
        assert_eq!(public.client_id, "id");
        assert_eq!(public.scopes, vec!["account"]);
        assert!(public.supports_refresh);
        assert_eq!(public.authorize_url, "https://bitbucket.org/site/oauth2/authorize");
    }

    #[test]
    fn test_with_base_url_layout() {
        let endpoints = ProviderEndpoints::with_base_url(OAuthProvider::GitLab, "https://git.corp/");
        assert_eq!(endpoints.token_url, "https://git.corp/oauth/token");
        assert_eq!(endpoints.api_url("/user"), "https://git.corp/api/v4/user");
    }
}
