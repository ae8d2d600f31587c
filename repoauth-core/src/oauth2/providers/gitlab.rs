//! GitLab `OAuth2` provider (gitlab.com or self-hosted)

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

use crate::oauth2::http::{self, HttpClientConfig};
use crate::oauth2::Provider;
use crate::{
    models::{OAuthProvider, OAuthToken, ProviderConfig, UserEmail, UserInfo},
    Error, Result,
};

#[derive(Deserialize)]
struct GitLabUser {
    id: u64,
    username: String,
    name: Option<String>,
    email: Option<String>,
    public_email: Option<String>,
    avatar_url: Option<String>,
    web_url: Option<String>,
}

#[derive(Deserialize)]
struct GitLabEmail {
    email: String,
    confirmed_at: Option<String>,
}

/// GitLab `OAuth2` provider
#[derive(Debug)]
pub struct GitLabProvider {
    config: ProviderConfig,
    http_client: Client,
}

impl GitLabProvider {
    /// Create a GitLab provider
    ///
    /// # Errors
    /// `Error::Configuration` if credentials are blank or an endpoint URL is malformed.
    pub fn new(config: ProviderConfig, http: &HttpClientConfig) -> Result<Self> {
        if config.provider != OAuthProvider::GitLab {
            return Err(Error::Configuration(format!(
                "GitLab provider given {} configuration",
                config.provider.display_name()
            )));
        }
        config.validate()?;
        Ok(Self {
            config,
            http_client: http.build_client()?,
        })
    }

    /// Create a provider against gitlab.com
    ///
    /// # Errors
    /// `Error::Configuration` if either credential is blank.
    pub fn with_credentials(client_id: &str, client_secret: &str) -> Result<Self> {
        let config = ProviderConfig::new(OAuthProvider::GitLab, client_id, client_secret)?;
        Self::new(config, &HttpClientConfig::default())
    }

    async fn fetch_user(&self, access_token: &str) -> Result<(GitLabUser, serde_json::Value)> {
        let url = self.config.endpoints.api_url("/user");
        let raw = http::get_json_value(OAuthProvider::GitLab, &self.http_client, &url, access_token, None).await?;
        let user = http::decode(OAuthProvider::GitLab, &raw, "user info")?;
        Ok((user, raw))
    }
}

#[async_trait]
impl Provider for GitLabProvider {
    fn provider(&self) -> OAuthProvider {
        OAuthProvider::GitLab
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
        _state: Option<&str>,
    ) -> Result<OAuthToken> {
        let mut form = vec![
            ("client_id", self.config.client_id.clone()),
            ("client_secret", self.config.client_secret.clone()),
            ("code", code.to_string()),
            ("grant_type", "authorization_code".to_string()),
        ];
        if let Some(redirect_uri) = http::resolve_redirect_uri(&self.config, redirect_uri) {
            form.push(("redirect_uri", redirect_uri));
        }

        let request = self
            .http_client
            .post(&self.config.endpoints.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&form);
        http::send_token_request(OAuthProvider::GitLab, request).await
    }

    async fn get_user_info(&self, access_token: &str) -> Result<UserInfo> {
        let (user, raw) = self.fetch_user(access_token).await?;

        Ok(UserInfo {
            id: user.id.to_string(),
            username: user.username,
            name: user.name,
            email: user.email.or(user.public_email).filter(|e| !e.is_empty()),
            avatar_url: user.avatar_url,
            profile_url: user.web_url,
            provider: OAuthProvider::GitLab,
            raw_data: raw,
        })
    }

    /// Secondary addresses from `/user/emails`, plus the account's primary
    /// address from `/user` when it is not already listed.
    async fn get_user_emails(&self, access_token: &str) -> Result<Vec<UserEmail>> {
        let url = self.config.endpoints.api_url("/user/emails");
        let raw = http::get_json_value(
            OAuthProvider::GitLab,
            &self.http_client,
            &url,
            access_token,
            Some(OAuthProvider::GitLab.email_scope()),
        )
        .await?;
        let listed: Vec<GitLabEmail> = http::decode(OAuthProvider::GitLab, &raw, "user emails")?;

        let (user, _) = self.fetch_user(access_token).await?;
        let primary = user
            .email
            .filter(|e| !e.is_empty())
            .map(|e| e.to_lowercase());

        let mut emails = Vec::with_capacity(listed.len() + 1);
        for entry in listed {
            let Ok(email) = UserEmail::new(&entry.email) else {
                warn!("Skipping malformed GitLab email address");
                continue;
            };
            let email = email.with_verified(entry.confirmed_at.is_some());
            let is_primary = primary.as_deref() == Some(email.email.as_str());
            emails.push(email.with_primary(is_primary));
        }
        if let Some(primary) = primary {
            if !emails.iter().any(|e| e.email == primary) {
                emails.insert(0, UserEmail::new(primary)?.with_primary(true).with_verified(true));
            }
        }
        Ok(emails)
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<Option<OAuthToken>> {
        let form = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];
        let request = self
            .http_client
            .post(&self.config.endpoints.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&form);
        http::send_token_request(OAuthProvider::GitLab, request).await.map(Some)
    }

    async fn revoke_token(&self, access_token: &str) -> Result<bool> {
        let form = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("token", access_token),
        ];
        let request = self
            .http_client
            .post(&self.config.endpoints.revoke_url)
            .form(&form);
        http::send_revoke_request(OAuthProvider::GitLab, request).await
    }

    async fn validate_token(&self, access_token: &str) -> Result<bool> {
        let url = self.config.endpoints.api_url("/user");
        http::probe_token(OAuthProvider::GitLab, &self.http_client, &url, access_token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_requires_client_id() {
        assert!(matches!(
            GitLabProvider::with_credentials("", "secret"),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            GitLabProvider::with_credentials("  ", "secret"),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_auth_url() {
        let provider = GitLabProvider::with_credentials("gl-client", "gl-secret").unwrap();
        let (url, _) = provider
            .generate_auth_url(&[], "https://app.example.com/callback", Some("st"))
            .unwrap();
        assert!(url.starts_with("https://gitlab.com/oauth/authorize?"));

        let parsed = url::Url::parse(&url).unwrap();
        let params: HashMap<_, _> = parsed.query_pairs().into_owned().collect();
        assert_eq!(params["scope"], "read_user");
        assert_eq!(params["response_type"], "code");
    }
}
