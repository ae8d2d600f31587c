//! `OAuth2` identity providers and their registry
//!
//! # Architecture
//!
//! 1. **Provider trait**: the capability set every IdP implements
//! 2. **Closed set of implementations**: GitHub, GitLab, Bitbucket
//! 3. **Registry**: provider enum -> shared instance, built once from config

pub mod http;
pub mod providers;
pub mod registry;

pub use http::HttpClientConfig;
pub use providers::{create_provider, BitbucketProvider, GitHubProvider, GitLabProvider};
pub use registry::ProviderRegistry;

use async_trait::async_trait;

use crate::{
    models::{OAuthProvider, OAuthToken, ProviderConfig, UserEmail, UserInfo},
    Result,
};

/// `OAuth2` provider trait
///
/// One implementation per identity provider. Implementations hold only
/// immutable configuration and a connection-pooled HTTP client, so a single
/// instance is shared across concurrent requests.
#[async_trait]
pub trait Provider: Send + Sync + std::fmt::Debug {
    /// Which IdP this is
    fn provider(&self) -> OAuthProvider;

    fn config(&self) -> &ProviderConfig;

    fn supports_refresh(&self) -> bool {
        self.provider().supports_refresh()
    }

    /// Build the authorization URL the user is sent to
    ///
    /// Empty `scopes` means the configured (or provider default) scopes.
    /// A state token is generated when `state` is `None`. Returns `(url, state)`.
    fn generate_auth_url(
        &self,
        scopes: &[String],
        redirect_uri: &str,
        state: Option<&str>,
    ) -> Result<(String, String)>;

    /// Exchange an authorization code for an access token
    async fn exchange_code_for_token(
        &self,
        code: &str,
        redirect_uri: &str,
        state: Option<&str>,
    ) -> Result<OAuthToken>;

    /// Profile of the token's owner
    async fn get_user_info(&self, access_token: &str) -> Result<UserInfo>;

    /// Email addresses of the token's owner
    async fn get_user_emails(&self, access_token: &str) -> Result<Vec<UserEmail>>;

    /// New token from a refresh token; `None` when the provider cannot refresh
    async fn refresh_token(&self, refresh_token: &str) -> Result<Option<OAuthToken>>;

    async fn revoke_token(&self, access_token: &str) -> Result<bool>;

    /// `false` when the provider reports the token as invalid or expired
    async fn validate_token(&self, access_token: &str) -> Result<bool>;
}
