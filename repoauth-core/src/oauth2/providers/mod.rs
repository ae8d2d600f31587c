//! `OAuth2` provider implementations
//!
//! Each provider is a separate module with its own struct over a shared
//! [`ProviderConfig`]. [`create_provider`] maps the closed set of
//! [`OAuthProvider`] variants to their implementation.

pub mod bitbucket;
pub mod github;
pub mod gitlab;

pub use bitbucket::BitbucketProvider;
pub use github::GitHubProvider;
pub use gitlab::GitLabProvider;

use std::sync::Arc;

use crate::models::{OAuthProvider, ProviderConfig};
use crate::oauth2::{HttpClientConfig, Provider};
use crate::Result;

/// Build the provider implementation matching `config.provider`
///
/// # Errors
/// `Error::Configuration` if the configuration is invalid.
pub fn create_provider(config: ProviderConfig, http: &HttpClientConfig) -> Result<Arc<dyn Provider>> {
    let provider: Arc<dyn Provider> = match config.provider {
        OAuthProvider::GitHub => Arc::new(GitHubProvider::new(config, http)?),
        OAuthProvider::GitLab => Arc::new(GitLabProvider::new(config, http)?),
        OAuthProvider::Bitbucket => Arc::new(BitbucketProvider::new(config, http)?),
    };
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_provider_dispatches_on_kind() {
        for kind in OAuthProvider::ALL {
            let config = ProviderConfig::new(kind, "id", "secret").unwrap();
            let provider = create_provider(config, &HttpClientConfig::default()).unwrap();
            assert_eq!(provider.provider(), kind);
            assert_eq!(provider.supports_refresh(), kind != OAuthProvider::GitHub);
        }
    }
}
