//! GitHub `OAuth2` provider

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::Deserialize;
use tracing::debug;

use crate::oauth2::http::{self, HttpClientConfig};
use crate::oauth2::Provider;
use crate::{
    models::{OAuthProvider, OAuthToken, ProviderConfig, UserEmail, UserInfo},
    Error, Result,
};

#[derive(Deserialize)]
struct GitHubUser {
    id: u64,
    login: String,
    name: Option<String>,
    email: Option<String>,
    avatar_url: Option<String>,
    html_url: Option<String>,
}

/// GitHub `OAuth2` provider
///
/// Classic OAuth apps issue non-expiring tokens without refresh tokens.
#[derive(Debug)]
pub struct GitHubProvider {
    config: ProviderConfig,
    http_client: Client,
}

impl GitHubProvider {
    /// Create a GitHub provider
    ///
    /// # Errors
    /// `Error::Configuration` if credentials are blank or an endpoint URL is malformed.
    pub fn new(config: ProviderConfig, http: &HttpClientConfig) -> Result<Self> {
        if config.provider != OAuthProvider::GitHub {
            return Err(Error::Configuration(format!(
                "GitHub provider given {} configuration",
                config.provider.display_name()
            )));
        }
        config.validate()?;
        Ok(Self {
            config,
            http_client: http.build_client()?,
        })
    }

    /// Create a provider against github.com
    ///
    /// # Errors
    /// `Error::Configuration` if either credential is blank.
    pub fn with_credentials(client_id: &str, client_secret: &str) -> Result<Self> {
        let config = ProviderConfig::new(OAuthProvider::GitHub, client_id, client_secret)?;
        Self::new(config, &HttpClientConfig::default())
    }

    fn revoke_url(&self) -> String {
        self.config
            .endpoints
            .revoke_url
            .replace("{client_id}", &self.config.client_id)
    }
}

#[async_trait]
impl Provider for GitHubProvider {
    fn provider(&self) -> OAuthProvider {
        OAuthProvider::GitHub
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn generate_auth_url(
        &self,
        scopes: &[String],
        redirect_uri: &str,
        state: Option<&str>,
    ) -> Result<(String, String)> {
        http::build_auth_url(&self.config, scopes, redirect_uri, state)
    }

    async fn exchange_code_for_token(
        &self,
        code: &str,
        redirect_uri: &str,
        state: Option<&str>,
    ) -> Result<OAuthToken> {
        let mut form = vec![
            ("client_id", self.config.client_id.clone()),
            ("client_secret", self.config.client_secret.clone()),
            ("code", code.to_string()),
        ];
        if let Some(redirect_uri) = http::resolve_redirect_uri(&self.config, redirect_uri) {
            form.push(("redirect_uri", redirect_uri));
        }
        if let Some(state) = state {
            form.push(("state", state.to_string()));
        }

        let request = self
            .http_client
            .post(&self.config.endpoints.token_url)
            .header(header::ACCEPT, "application/json")
            .form(&form);
        http::send_token_request(OAuthProvider::GitHub, request).await
    }

    async fn get_user_info(&self, access_token: &str) -> Result<UserInfo> {
        let url = self.config.endpoints.api_url("/user");
        let raw = http::get_json_value(OAuthProvider::GitHub, &self.http_client, &url, access_token, None).await?;
        let user: GitHubUser = http::decode(OAuthProvider::GitHub, &raw, "user info")?;

        Ok(UserInfo {
            id: user.id.to_string(),
            username: user.login,
            name: user.name,
            email: user.email,
            avatar_url: user.avatar_url,
            profile_url: user.html_url,
            provider: OAuthProvider::GitHub,
            raw_data: raw,
        })
    }

    async fn get_user_emails(&self, access_token: &str) -> Result<Vec<UserEmail>> {
        let url = self.config.endpoints.api_url("/user/emails");
        let raw = http::get_json_value(
            OAuthProvider::GitHub,
            &self.http_client,
            &url,
            access_token,
            Some(OAuthProvider::GitHub.email_scope()),
        )
        .await?;
        http::decode(OAuthProvider::GitHub, &raw, "user emails")
    }

    async fn refresh_token(&self, _refresh_token: &str) -> Result<Option<OAuthToken>> {
        debug!("GitHub OAuth apps do not support token refresh");
        Ok(None)
    }

    async fn revoke_token(&self, access_token: &str) -> Result<bool> {
        let request = self
            .http_client
            .delete(self.revoke_url())
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .header(header::ACCEPT, "application/vnd.github+json")
            .query(&[("access_token", access_token)]);
        http::send_revoke_request(OAuthProvider::GitHub, request).await
    }

    async fn validate_token(&self, access_token: &str) -> Result<bool> {
        let url = self.config.endpoints.api_url("/user");
        http::probe_token(OAuthProvider::GitHub, &self.http_client, &url, access_token).await
    }
}
