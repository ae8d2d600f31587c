//! HTTP plumbing shared by the provider implementations

use oauth2::{basic::BasicClient, AuthUrl, ClientId, CsrfToken, RedirectUrl, Scope};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::borrow::Cow;
use std::time::Duration;
use tracing::{debug, warn};

use crate::{
    models::{OAuthProvider, OAuthToken, ProviderConfig},
    service::state::{StateManager, DEFAULT_STATE_LENGTH},
    Error, Result,
};

/// Default timeout for a single IdP request
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
/// Sent on every IdP request (GitHub rejects API calls without one)
pub const DEFAULT_USER_AGENT: &str = concat!("repoauth/", env!("CARGO_PKG_VERSION"));

/// Settings for the per-provider HTTP client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl HttpClientConfig {
    pub(crate) fn build_client(&self) -> Result<Client> {
        Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent.clone())
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to build HTTP client: {e}")))
    }
}

/// Pick the caller's redirect URI, falling back to the configured one
pub(crate) fn resolve_redirect_uri(config: &ProviderConfig, redirect_uri: &str) -> Option<String> {
    if redirect_uri.trim().is_empty() {
        config.redirect_uri.clone()
    } else {
        Some(redirect_uri.to_string())
    }
}

/// Build an authorization URL, generating a state token when none is given
///
/// Returns `(url, state)`.
pub(crate) fn build_auth_url(
    config: &ProviderConfig,
    scopes: &[String],
    redirect_uri: &str,
    state: Option<&str>,
) -> Result<(String, String)> {
    let scopes = if scopes.is_empty() {
        config.effective_scopes()
    } else {
        scopes.to_vec()
    };
    let state = state
        .filter(|s| !s.is_empty())
        .map_or_else(|| StateManager::generate_state(DEFAULT_STATE_LENGTH), str::to_string);

    let auth_url = AuthUrl::new(config.endpoints.authorize_url.clone())
        .map_err(|e| Error::Configuration(format!("Invalid authorize URL: {e}")))?;
    let client = BasicClient::new(ClientId::new(config.client_id.clone())).set_auth_uri(auth_url);

    let mut request = client
        .authorize_url(|| CsrfToken::new(state))
        .add_scopes(scopes.into_iter().map(Scope::new));
    if let Some(redirect_uri) = resolve_redirect_uri(config, redirect_uri) {
        let redirect = RedirectUrl::new(redirect_uri)
            .map_err(|e| Error::InvalidInput(format!("Invalid redirect URI: {e}")))?;
        request = request.set_redirect_uri(Cow::Owned(redirect));
    }

    let (url, csrf_token) = request.url();
    Ok((url.to_string(), csrf_token.secret().clone()))
}

/// Token endpoint body, success or error shape
#[derive(Debug, Default, Deserialize)]
struct TokenEndpointBody {
    access_token: Option<String>,
    token_type: Option<String>,
    #[serde(alias = "scopes")]
    scope: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Turn a token endpoint response into a token or a `TokenExchange` error
///
/// GitHub answers some failures with HTTP 200 and an `error` field, so the
/// body is inspected regardless of status.
pub(crate) async fn read_token_response(
    provider: OAuthProvider,
    response: Response,
) -> Result<OAuthToken> {
    let status = response.status();
    let text = response.text().await.map_err(|e| {
        warn!(provider = %provider, error = %e, "Failed to read token response");
        Error::exchange_failed(provider)
    })?;
    let body = serde_json::from_str::<TokenEndpointBody>(&text).ok();

    if let Some(TokenEndpointBody {
        error,
        error_description,
        ..
    }) = body
        .as_ref()
        .filter(|b| b.error.is_some() || (!status.is_success() && b.error_description.is_some()))
    {
        warn!(
            provider = %provider,
            status = status.as_u16(),
            error = error.as_deref().unwrap_or_default(),
            "Token endpoint rejected the request"
        );
        return Err(Error::exchange_rejected(
            provider,
            error.clone(),
            error_description.clone(),
        ));
    }

    if !status.is_success() {
        warn!(provider = %provider, status = status.as_u16(), "Token endpoint returned an error status");
        return Err(Error::exchange_failed(provider));
    }

    let Some(body) = body else {
        warn!(provider = %provider, "Token endpoint returned an unparseable body");
        return Err(Error::exchange_failed(provider));
    };
    let Some(access_token) = body.access_token.filter(|t| !t.is_empty()) else {
        warn!(provider = %provider, "Token endpoint response has no access_token");
        return Err(Error::exchange_failed(provider));
    };

    let mut token = OAuthToken::new(access_token);
    if let Some(token_type) = body.token_type {
        token.token_type = token_type.to_lowercase();
    }
    token.scope = body.scope;
    token.refresh_token = body.refresh_token;
    token.expires_in = body.expires_in;

    debug!(provider = %provider, has_refresh = token.refresh_token.is_some(), "Obtained access token");
    Ok(token)
}

/// Send a token endpoint request; transport failures become `TokenExchange`
pub(crate) async fn send_token_request(
    provider: OAuthProvider,
    request: RequestBuilder,
) -> Result<OAuthToken> {
    let response = request.send().await.map_err(|e| {
        let e = e.without_url();
        warn!(provider = %provider, error = %e, timeout = e.is_timeout(), "Token request failed");
        Error::exchange_failed(provider)
    })?;
    read_token_response(provider, response).await
}

/// Send an API request; transport failures (including timeouts) become `OAuth`
///
/// The request URL is dropped from the error since it may carry a token.
pub(crate) async fn send_api_request(
    provider: OAuthProvider,
    request: RequestBuilder,
) -> Result<Response> {
    request.send().await.map_err(|e| {
        let e = e.without_url();
        let message = if e.is_timeout() {
            "Request to provider timed out".to_string()
        } else {
            format!("Request to provider failed: {e}")
        };
        Error::oauth(provider, message)
    })
}

/// Map 401/403/other error statuses of an API call to typed errors
///
/// `required_scope` turns a 403 into `InsufficientScope`.
pub(crate) fn check_api_status(
    provider: OAuthProvider,
    response: Response,
    required_scope: Option<&str>,
) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match (status, required_scope) {
        (StatusCode::UNAUTHORIZED, _) => Err(Error::InvalidToken { provider }),
        (StatusCode::FORBIDDEN, Some(scope)) => Err(Error::InsufficientScope {
            provider,
            scope: scope.to_string(),
        }),
        _ => Err(Error::OAuth {
            provider,
            message: format!("API request failed with status {status}"),
            status: Some(status.as_u16()),
        }),
    }
}

/// Authenticated GET returning the raw JSON payload
pub(crate) async fn get_json_value(
    provider: OAuthProvider,
    client: &Client,
    url: &str,
    access_token: &str,
    required_scope: Option<&str>,
) -> Result<serde_json::Value> {
    let request = client
        .get(url)
        .bearer_auth(access_token)
        .header(reqwest::header::ACCEPT, "application/json");
    let response = send_api_request(provider, request).await?;
    let response = check_api_status(provider, response, required_scope)?;
    response
        .json::<serde_json::Value>()
        .await
        .map_err(|e| Error::oauth(provider, format!("Failed to parse response: {e}")))
}

/// Decode a payload previously fetched with [`get_json_value`]
pub(crate) fn decode<T: DeserializeOwned>(
    provider: OAuthProvider,
    value: &serde_json::Value,
    what: &str,
) -> Result<T> {
    T::deserialize(value).map_err(|e| Error::oauth(provider, format!("Failed to parse {what}: {e}")))
}

/// `true` for 2xx, `false` for 401, error otherwise
pub(crate) async fn probe_token(
    provider: OAuthProvider,
    client: &Client,
    url: &str,
    access_token: &str,
) -> Result<bool> {
    let request = client
        .get(url)
        .bearer_auth(access_token)
        .header(reqwest::header::ACCEPT, "application/json");
    let response = send_api_request(provider, request).await?;
    match response.status() {
        status if status.is_success() => Ok(true),
        StatusCode::UNAUTHORIZED => Ok(false),
        status => Err(Error::OAuth {
            provider,
            message: format!("Token validation failed with status {status}"),
            status: Some(status.as_u16()),
        }),
    }
}

/// Outcome of a revocation request: any 2xx counts as revoked
pub(crate) async fn send_revoke_request(
    provider: OAuthProvider,
    request: RequestBuilder,
) -> Result<bool> {
    let response = send_api_request(provider, request).await?;
    let status = response.status();
    if status.is_success() {
        debug!(provider = %provider, "Revoked access token");
        Ok(true)
    } else {
        Err(Error::OAuth {
            provider,
            message: format!("Token revocation failed with status {status}"),
            status: Some(status.as_u16()),
        })
    }
}
