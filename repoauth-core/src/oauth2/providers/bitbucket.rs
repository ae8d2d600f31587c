//! Bitbucket Cloud `OAuth2` provider

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::oauth2::http::{self, HttpClientConfig};
use crate::oauth2::Provider;
use crate::{
    models::{OAuthProvider, OAuthToken, ProviderConfig, UserEmail, UserInfo},
    Error, Result,
};

/// Upper bound on `/user/emails` pages followed
const MAX_EMAIL_PAGES: usize = 10;

#[derive(Deserialize)]
struct BitbucketLink {
    href: String,
}

#[derive(Default, Deserialize)]
struct BitbucketLinks {
    avatar: Option<BitbucketLink>,
    html: Option<BitbucketLink>,
}

#[derive(Deserialize)]
struct BitbucketUser {
    uuid: Option<String>,
    account_id: Option<String>,
    username: Option<String>,
    nickname: Option<String>,
    display_name: Option<String>,
    #[serde(default)]
    links: BitbucketLinks,
}

#[derive(Deserialize)]
struct BitbucketEmail {
    email: String,
    #[serde(default)]
    is_primary: bool,
    #[serde(default)]
    is_confirmed: bool,
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Deserialize)]
struct BitbucketPage<T> {
    #[serde(default = "Vec::new")]
    values: Vec<T>,
    next: Option<String>,
}

/// Bitbucket `OAuth2` provider
///
/// Client credentials go in HTTP Basic auth on the token and revoke endpoints.
#[derive(Debug)]
pub struct BitbucketProvider {
    config: ProviderConfig,
    http_client: Client,
}

impl BitbucketProvider {
    /// Create a Bitbucket provider
    ///
    /// # Errors
    /// `Error::Configuration` if credentials are blank or an endpoint URL is malformed.
    pub fn new(config: ProviderConfig, http: &HttpClientConfig) -> Result<Self> {
        if config.provider != OAuthProvider::Bitbucket {
            return Err(Error::Configuration(format!(
                "Bitbucket provider given {} configuration",
                config.provider.display_name()
            )));
        }
        config.validate()?;
        Ok(Self {
            config,
            http_client: http.build_client()?,
        })
    }

    /// Create a provider against bitbucket.org
    ///
    /// # Errors
    /// `Error::Configuration` if either credential is blank.
    pub fn with_credentials(client_id: &str, client_secret: &str) -> Result<Self> {
        let config = ProviderConfig::new(OAuthProvider::Bitbucket, client_id, client_secret)?;
        Self::new(config, &HttpClientConfig::default())
    }

    /// Pagination links are only followed within the configured API
    fn is_api_url(&self, url: &str) -> bool {
        let base = self.config.endpoints.api_base_url.trim_end_matches('/');
        url.strip_prefix(base)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'))
    }

    fn token_request(&self, form: &[(&str, &str)]) -> reqwest::RequestBuilder {
        self.http_client
            .post(&self.config.endpoints.token_url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .header(reqwest::header::ACCEPT, "application/json")
            .form(form)
    }
}

#[async_trait]
impl Provider for BitbucketProvider {
    fn provider(&self) -> OAuthProvider {
        OAuthProvider::Bitbucket
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
        let redirect_uri = http::resolve_redirect_uri(&self.config, redirect_uri);
        let mut form = vec![("grant_type", "authorization_code"), ("code", code)];
        if let Some(redirect_uri) = redirect_uri.as_deref() {
            form.push(("redirect_uri", redirect_uri));
        }
        http::send_token_request(OAuthProvider::Bitbucket, self.token_request(&form)).await
    }

    async fn get_user_info(&self, access_token: &str) -> Result<UserInfo> {
        let url = self.config.endpoints.api_url("/user");
        let raw = http::get_json_value(OAuthProvider::Bitbucket, &self.http_client, &url, access_token, None).await?;
        let user: BitbucketUser = http::decode(OAuthProvider::Bitbucket, &raw, "user info")?;

        let id = user
            .account_id
            .clone()
            .or_else(|| user.uuid.clone())
            .ok_or_else(|| Error::oauth(OAuthProvider::Bitbucket, "User payload has no account id"))?;
        let username = user
            .username
            .or(user.nickname)
            .unwrap_or_else(|| id.clone());

        // /user carries no address; take the primary one when the token allows it
        let email = match self.get_user_emails(access_token).await {
            Ok(emails) => emails.into_iter().find(|e| e.primary).map(|e| e.email),
            Err(e) => {
                debug!(error = %e, "Bitbucket primary email unavailable");
                None
            }
        };

        Ok(UserInfo {
            id,
            username,
            name: user.display_name,
            email,
            avatar_url: user.links.avatar.map(|l| l.href),
            profile_url: user.links.html.map(|l| l.href),
            provider: OAuthProvider::Bitbucket,
            raw_data: raw,
        })
    }

    async fn get_user_emails(&self, access_token: &str) -> Result<Vec<UserEmail>> {
        let mut emails = Vec::new();
        let mut next = Some(self.config.endpoints.api_url("/user/emails"));

        for _ in 0..MAX_EMAIL_PAGES {
            let Some(url) = next.take() else { break };
            let raw = http::get_json_value(
                OAuthProvider::Bitbucket,
                &self.http_client,
                &url,
                access_token,
                Some(OAuthProvider::Bitbucket.email_scope()),
            )
            .await?;
            let page: BitbucketPage<BitbucketEmail> =
                http::decode(OAuthProvider::Bitbucket, &raw, "user emails")?;

            for entry in page.values {
                match UserEmail::new(&entry.email) {
                    Ok(email) => emails.push(
                        email
                            .with_primary(entry.is_primary)
                            .with_verified(entry.is_confirmed)
                            .with_visibility(entry.kind),
                    ),
                    Err(_) => warn!("Skipping malformed Bitbucket email address"),
                }
            }
            next = page.next.filter(|url| {
                let trusted = self.is_api_url(url);
                if !trusted {
                    warn!("Ignoring Bitbucket email page outside the API base URL");
                }
                trusted
            });
        }
        if next.is_some() {
            warn!(
                pages = MAX_EMAIL_PAGES,
                collected = emails.len(),
                "Bitbucket email list truncated at page limit"
            );
        }

        Ok(emails)
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<Option<OAuthToken>> {
        let form = [("grant_type", "refresh_token"), ("refresh_token", refresh_token)];
        http::send_token_request(OAuthProvider::Bitbucket, self.token_request(&form))
            .await
            .map(Some)
    }

    async fn revoke_token(&self, access_token: &str) -> Result<bool> {
        let request = self
            .http_client
            .post(&self.config.endpoints.revoke_url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[("token", access_token)]);
        http::send_revoke_request(OAuthProvider::Bitbucket, request).await
    }

    async fn validate_token(&self, access_token: &str) -> Result<bool> {
        let url = self.config.endpoints.api_url("/user");
        http::probe_token(OAuthProvider::Bitbucket, &self.http_client, &url, access_token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_requires_client_secret() {
        assert!(matches!(
            BitbucketProvider::with_credentials("id", "\t"),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_auth_url() {
        let provider = BitbucketProvider::with_credentials("bb-client", "bb-secret").unwrap();
        let (url, state) = provider
            .generate_auth_url(&[], "https://app.example.com/callback", None)
            .unwrap();
        assert!(url.starts_with("https://bitbucket.org/site/oauth2/authorize?"));

        let parsed = url::Url::parse(&url).unwrap();
        let params: HashMap<_, _> = parsed.query_pairs().into_owned().collect();
        assert_eq!(params["client_id"], "bb-client");
        assert_eq!(params["scope"], "account");
        assert_eq!(params["state"], state);
    }

    #[test]
    fn test_pagination_stays_on_api_host() {
        let provider = BitbucketProvider::with_credentials("id", "secret").unwrap();
        assert!(provider.is_api_url("https://api.bitbucket.org/2.0/user/emails?page=2"));
        assert!(!provider.is_api_url("https://api.bitbucket.org/2.0evil/user/emails"));
        assert!(!provider.is_api_url("https://api.bitbucket.org.attacker.test/2.0/user/emails"));
        assert!(!provider.is_api_url("https://attacker.test/?next=https://api.bitbucket.org/2.0"));
    }

    #[test]
    fn test_page_without_next() {
        let page: BitbucketPage<BitbucketEmail> = serde_json::from_value(serde_json::json!({
            "values": [{ "email": "a@b.c", "is_primary": true, "is_confirmed": false, "type": "email" }]
        }))
        .unwrap();
        assert_eq!(page.values.len(), 1);
        assert!(page.next.is_none());
    }
}
