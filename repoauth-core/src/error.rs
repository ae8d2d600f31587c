use thiserror::Error;

use crate::models::OAuthProvider;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("OAuth provider not found: {0}")]
    ProviderNotFound(String),

    #[error("Invalid or expired OAuth state: {0}")]
    InvalidState(String),

    #[error("OAuth state not found: {0}")]
    StateNotFound(String),

    #[error("OAuth state expired: {0}")]
    StateExpired(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The IdP rejected an authorization code or refresh token, or the
    /// token endpoint could not be reached.
    #[error("{message}")]
    TokenExchange {
        provider: OAuthProvider,
        message: String,
        error: Option<String>,
        error_description: Option<String>,
    },

    #[error("{} access token is invalid or expired", provider.display_name())]
    InvalidToken { provider: OAuthProvider },

    #[error("{} token lacks the required '{scope}' scope", provider.display_name())]
    InsufficientScope {
        provider: OAuthProvider,
        scope: String,
    },

    #[error("{} OAuth error: {message}", provider.display_name())]
    OAuth {
        provider: OAuthProvider,
        message: String,
        status: Option<u16>,
    },
}

impl Error {
    /// Generic token exchange failure with no IdP-supplied detail.
    pub(crate) fn exchange_failed(provider: OAuthProvider) -> Self {
        Self::TokenExchange {
            provider,
            message: format!(
                "{} OAuth error: Failed to exchange code for token",
                provider.display_name()
            ),
            error: None,
            error_description: None,
        }
    }

    /// Token exchange failure surfacing the IdP's error body.
    ///
    /// `error_description` wins over the bare `error` code for the message.
    pub(crate) fn exchange_rejected(
        provider: OAuthProvider,
        error: Option<String>,
        error_description: Option<String>,
    ) -> Self {
        let detail = error_description
            .as_deref()
            .or(error.as_deref())
            .unwrap_or("Failed to exchange code for token");
        Self::TokenExchange {
            provider,
            message: format!("{} OAuth error: {detail}", provider.display_name()),
            error,
            error_description,
        }
    }

    pub(crate) fn oauth(provider: OAuthProvider, message: impl Into<String>) -> Self {
        Self::OAuth {
            provider,
            message: message.into(),
            status: None,
        }
    }

    /// Provider that produced this error, if any.
    #[must_use]
    pub fn provider(&self) -> Option<OAuthProvider> {
        match self {
            Self::TokenExchange { provider, .. }
            | Self::InvalidToken { provider }
            | Self::InsufficientScope { provider, .. }
            | Self::OAuth { provider, .. } => Some(*provider),
            _ => None,
        }
    }

    /// True for failures of authenticated API calls against an IdP.
    #[must_use]
    pub fn is_oauth_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidToken { .. } | Self::InsufficientScope { .. } | Self::OAuth { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_rejected_prefers_description() {
        let err = Error::exchange_rejected(
            OAuthProvider::GitLab,
            Some("invalid_grant".to_string()),
            Some("The authorization code is invalid or has expired.".to_string()),
        );
        let message = err.to_string();
        assert!(message.starts_with("GitLab OAuth error:"));
        assert!(message.contains("The authorization code is invalid or has expired."));
    }

    #[test]
    fn test_exchange_rejected_falls_back_to_code() {
        let err = Error::exchange_rejected(
            OAuthProvider::GitHub,
            Some("bad_verification_code".to_string()),
            None,
        );
        assert_eq!(err.to_string(), "GitHub OAuth error: bad_verification_code");
    }

    #[test]
    fn test_exchange_failed_is_generic() {
        let err = Error::exchange_failed(OAuthProvider::Bitbucket);
        assert_eq!(
            err.to_string(),
            "Bitbucket OAuth error: Failed to exchange code for token"
        );
        assert_eq!(err.provider(), Some(OAuthProvider::Bitbucket));
        assert!(!err.is_oauth_error());
    }

    #[test]
    fn test_oauth_error_grouping() {
        assert!(Error::InvalidToken { provider: OAuthProvider::GitHub }.is_oauth_error());
        assert!(Error::oauth(OAuthProvider::GitHub, "boom").is_oauth_error());
        assert!(!Error::ProviderNotFound("x".to_string()).is_oauth_error());
    }
}
