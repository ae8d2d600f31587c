//! `OAuth2` authentication service
//!
//! Single entry point for the authorization-code flow:
//! 1. Issue an authorization URL and remember its CSRF state
//! 2. On callback, consume the state and exchange the code for a token
//! 3. Fetch profile data with the token
//!
//! Tokens are returned to the caller, never stored here.

use std::collections::HashMap;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::{
    config::OAuthConfig,
    models::{AuthUrlResponse, OAuthProvider, OAuthToken, PublicProviderConfig, UserEmail, UserInfo},
    oauth2::{http, Provider, ProviderRegistry},
    service::state::{StateManager, DEFAULT_STATE_LENGTH},
    Error, Result,
};

/// Collapse the result of a best-effort operation, logging the failure
fn best_effort<T>(provider: OAuthProvider, operation: &str, result: Result<T>, fallback: T) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            warn!(provider = %provider, operation, error = %e, "OAuth provider call failed");
            fallback
        }
    }
}

/// `OAuth2` authentication service
#[derive(Clone)]
pub struct OAuthService {
    registry: ProviderRegistry,
    states: StateManager,
    state_length: usize,
}

impl std::fmt::Debug for OAuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthService")
            .field("providers", &self.registry.providers())
            .field("pending_states", &self.states.len())
            .finish_non_exhaustive()
    }
}

impl OAuthService {
    #[must_use]
    pub const fn new(registry: ProviderRegistry, states: StateManager) -> Self {
        Self {
            registry,
            states,
            state_length: DEFAULT_STATE_LENGTH,
        }
    }

    /// Build the registry and state manager from configuration
    ///
    /// # Errors
    /// `Error::Configuration` if an enabled provider is misconfigured.
    pub fn from_config(config: &OAuthConfig) -> Result<Self> {
        let registry = ProviderRegistry::new();
        let count = registry.init(config)?;
        if count == 0 {
            warn!("No OAuth providers configured");
        }
        Ok(Self::new(registry, StateManager::new(config.state_ttl())).with_state_length(config.state_length))
    }

    #[must_use]
    pub const fn with_state_length(mut self, state_length: usize) -> Self {
        self.state_length = state_length;
        self
    }

    #[must_use]
    pub const fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    #[must_use]
    pub const fn state_manager(&self) -> &StateManager {
        &self.states
    }

    fn resolve_redirect_uri(provider: &dyn Provider, redirect_uri: &str) -> Result<String> {
        http::resolve_redirect_uri(provider.config(), redirect_uri)
            .ok_or_else(|| Error::InvalidInput("redirect_uri must not be empty".to_string()))
    }

    /// Generate authorization URL
    ///
    /// An empty `redirect_uri` falls back to the provider's configured one.
    ///
    /// # Errors
    /// `Error::InvalidInput` for an empty provider or missing redirect URI,
    /// `Error::ProviderNotFound` if the provider is not registered.
    pub fn get_authorization_url(
        &self,
        provider: &str,
        scopes: &[String],
        redirect_uri: &str,
    ) -> Result<AuthUrlResponse> {
        self.get_authorization_url_with_metadata(provider, scopes, redirect_uri, HashMap::new())
    }

    /// Like [`get_authorization_url`](Self::get_authorization_url), attaching
    /// caller metadata to the stored state
    ///
    /// # Errors
    /// See [`get_authorization_url`](Self::get_authorization_url).
    pub fn get_authorization_url_with_metadata(
        &self,
        provider: &str,
        scopes: &[String],
        redirect_uri: &str,
        metadata: HashMap<String, String>,
    ) -> Result<AuthUrlResponse> {
        if provider.trim().is_empty() {
            return Err(Error::InvalidInput("provider must not be empty".to_string()));
        }
        let resolved = self.registry.get(provider)?;
        let kind = resolved.provider();
        let redirect_uri = Self::resolve_redirect_uri(resolved.as_ref(), redirect_uri)?;

        let state = StateManager::generate_state(self.state_length);
        let (auth_url, state) = resolved.generate_auth_url(scopes, &redirect_uri, Some(&state))?;

        let scopes = if scopes.is_empty() {
            resolved.config().effective_scopes()
        } else {
            scopes.to_vec()
        };
        self.states
            .store_state(&state, kind.as_str(), &redirect_uri, Some(scopes), Some(metadata))?;

        debug!(provider = %kind, "Generated OAuth authorization URL");

        Ok(AuthUrlResponse {
            auth_url,
            provider: kind.as_str().to_string(),
            state,
        })
    }

    /// Complete the callback: consume the state, then exchange the code
    ///
    /// The state is claimed atomically, so of two callbacks racing on the
    /// same state only one reaches the provider. If the provider rejects the
    /// code the state is put back and can be retried until it expires.
    ///
    /// # Errors
    /// `Error::InvalidState` if the state is unknown, expired or was issued for
    /// another provider or redirect URI; `Error::TokenExchange` if the provider
    /// rejects the code.
    pub async fn exchange_code_for_token(
        &self,
        provider: &str,
        code: &str,
        redirect_uri: &str,
        state: &str,
    ) -> Result<OAuthToken> {
        let resolved = self.registry.get(provider)?;
        let kind = resolved.provider();
        if code.trim().is_empty() {
            return Err(Error::InvalidInput("code must not be empty".to_string()));
        }
        let redirect_uri = Self::resolve_redirect_uri(resolved.as_ref(), redirect_uri)?;

        let entry = self.states.consume_state(state, provider, &redirect_uri).map_err(|e| {
            warn!(provider = %kind, "Rejected OAuth callback with invalid state");
            e
        })?;

        match resolved
            .exchange_code_for_token(code, &redirect_uri, Some(state))
            .await
        {
            Ok(token) => {
                info!(provider = %kind, "OAuth code exchanged for token");
                Ok(token)
            }
            Err(e) => {
                self.states.restore_state(entry);
                Err(e)
            }
        }
    }

    /// # Errors
    /// `Error::ProviderNotFound`, `Error::InvalidToken` or other `OAuth` errors.
    pub async fn get_user_info(&self, provider: &str, access_token: &str) -> Result<UserInfo> {
        self.registry.get(provider)?.get_user_info(access_token).await
    }

    /// # Errors
    /// `Error::ProviderNotFound`, `Error::InvalidToken`, `Error::InsufficientScope`
    /// or other `OAuth` errors.
    pub async fn get_user_emails(&self, provider: &str, access_token: &str) -> Result<Vec<UserEmail>> {
        self.registry.get(provider)?.get_user_emails(access_token).await
    }

    /// New token, or `None` if the provider cannot refresh or refused
    ///
    /// # Errors
    /// Only `Error::ProviderNotFound`; provider-side failures yield `None`.
    pub async fn refresh_token(&self, provider: &str, refresh_token: &str) -> Result<Option<OAuthToken>> {
        let resolved = self.registry.get(provider)?;
        let result = resolved.refresh_token(refresh_token).await;
        Ok(best_effort(resolved.provider(), "refresh_token", result, None))
    }

    /// # Errors
    /// Only `Error::ProviderNotFound`; provider-side failures yield `false`.
    pub async fn revoke_token(&self, provider: &str, access_token: &str) -> Result<bool> {
        let resolved = self.registry.get(provider)?;
        let result = resolved.revoke_token(access_token).await;
        Ok(best_effort(resolved.provider(), "revoke_token", result, false))
    }

    /// # Errors
    /// Only `Error::ProviderNotFound`; provider-side failures yield `false`.
    pub async fn validate_token(&self, provider: &str, access_token: &str) -> Result<bool> {
        let resolved = self.registry.get(provider)?;
        let result = resolved.validate_token(access_token).await;
        Ok(best_effort(resolved.provider(), "validate_token", result, false))
    }

    /// Identifiers of the registered providers
    #[must_use]
    pub fn get_available_providers(&self) -> Vec<String> {
        self.registry
            .providers()
            .into_iter()
            .map(|kind| kind.as_str().to_string())
            .collect()
    }

    pub fn cleanup_expired_states(&self) -> usize {
        self.states.cleanup_expired_states()
    }

    /// Public configuration of a registered provider; `None` otherwise
    #[must_use]
    pub fn get_provider_config(&self, provider: &str) -> Option<PublicProviderConfig> {
        self.registry
            .get(provider)
            .ok()
            .map(|resolved| resolved.config().public())
    }

    /// Run [`cleanup_expired_states`](Self::cleanup_expired_states) every `interval`
    ///
    /// Must be called from within a tokio runtime. Abort the handle to stop.
    #[must_use]
    pub fn spawn_state_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let states = self.states.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = states.cleanup_expired_states();
                if removed > 0 {
                    debug!(removed, "Swept expired OAuth states");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::ProviderConfig;
    use crate::oauth2::{create_provider, HttpClientConfig};
    use std::sync::Arc;

    const REDIRECT: &str = "https://app.example.com/auth/callback";

    fn service_with_clock() -> (OAuthService, ManualClock) {
        let registry = ProviderRegistry::new();
        for kind in OAuthProvider::ALL {
            let config = ProviderConfig::new(kind, format!("{kind}-id"), "secret").unwrap();
            registry.register(create_provider(config, &HttpClientConfig::default()).unwrap());
        }
        let clock = ManualClock::default();
        let states = StateManager::with_clock(chrono::Duration::minutes(10), Arc::new(clock.clone()));
        (OAuthService::new(registry, states), clock)
    }

    #[test]
    fn test_issued_state_validates_for_every_provider() {
        let (service, _) = service_with_clock();
        for kind in OAuthProvider::ALL {
            for scopes in [vec![], vec!["custom".to_string()]] {
                let response = service
                    .get_authorization_url(kind.as_str(), &scopes, REDIRECT)
                    .unwrap();
                assert_eq!(response.provider, kind.as_str());
                assert!(response.auth_url.contains(&response.state));
                assert!(service.state_manager().validate_state(&response.state, kind.as_str()));
            }
        }
    }

    #[test]
    fn test_state_records_scopes_and_metadata() {
        let (service, _) = service_with_clock();
        let metadata = HashMap::from([("return_to".to_string(), "/settings".to_string())]);
        let response = service
            .get_authorization_url_with_metadata("gitlab", &[], REDIRECT, metadata.clone())
            .unwrap();

        let stored = service.state_manager().get_state_data(&response.state).unwrap();
        assert_eq!(stored.scopes, vec!["read_user"]);
        assert_eq!(stored.redirect_uri, REDIRECT);
        assert_eq!(service.state_manager().get_state_metadata(&response.state).unwrap(), metadata);
    }

    #[test]
    fn test_authorization_url_errors() {
        let (service, _) = service_with_clock();
        assert!(matches!(
            service.get_authorization_url("", &[], REDIRECT),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            service.get_authorization_url("unknown", &[], REDIRECT),
            Err(Error::ProviderNotFound(_))
        ));
        assert!(matches!(
            service.get_authorization_url("github", &[], ""),
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_exchange_rejects_unknown_and_mismatched_state() {
        let (service, _) = service_with_clock();
        let response = service.get_authorization_url("github", &[], REDIRECT).unwrap();

        assert!(matches!(
            service.exchange_code_for_token("github", "code", REDIRECT, "bogus").await,
            Err(Error::InvalidState(_))
        ));
        assert!(matches!(
            service
                .exchange_code_for_token("gitlab", "code", REDIRECT, &response.state)
                .await,
            Err(Error::InvalidState(_))
        ));
        assert!(matches!(
            service
                .exchange_code_for_token("github", "code", "https://other.example.com/cb", &response.state)
                .await,
            Err(Error::InvalidState(_))
        ));
        assert!(service.state_manager().contains(&response.state));
    }

    #[tokio::test]
    async fn test_exchange_rejects_expired_state() {
        let (service, clock) = service_with_clock();
        let response = service.get_authorization_url("bitbucket", &[], REDIRECT).unwrap();
        clock.advance(chrono::Duration::minutes(11));

        let err = service
            .exchange_code_for_token("bitbucket", "code", REDIRECT, &response.state)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        assert!(err.to_string().contains("Invalid or expired OAuth state"));
    }

    #[tokio::test]
    async fn test_unregistered_provider_errors_propagate() {
        let (service, _) = service_with_clock();
        service.registry().unregister(OAuthProvider::GitLab);

        assert!(matches!(
            service.get_user_info("gitlab", "t").await,
            Err(Error::ProviderNotFound(_))
        ));
        assert!(matches!(
            service.refresh_token("gitlab", "t").await,
            Err(Error::ProviderNotFound(_))
        ));
        assert!(matches!(
            service.validate_token("gitlab", "t").await,
            Err(Error::ProviderNotFound(_))
        ));
        assert!(service.get_provider_config("gitlab").is_none());
    }

    #[tokio::test]
    async fn test_github_refresh_collapses_to_none() {
        let (service, _) = service_with_clock();
        assert!(service.refresh_token("github", "r").await.unwrap().is_none());
    }

    #[test]
    fn test_available_providers_and_public_config() {
        let (service, _) = service_with_clock();
        assert_eq!(service.get_available_providers(), vec!["github", "gitlab", "bitbucket"]);

        let public = service.get_provider_config("GitHub").unwrap();
        assert_eq!(public.client_id, "github-id");
        assert!(!public.supports_refresh);
    }

    #[test]
    fn test_cleanup_expired_states() {
        let (service, clock) = service_with_clock();
        service.get_authorization_url("github", &[], REDIRECT).unwrap();
        service.get_authorization_url("gitlab", &[], REDIRECT).unwrap();
        clock.advance(chrono::Duration::minutes(11));
        let fresh = service.get_authorization_url("bitbucket", &[], REDIRECT).unwrap();

        assert_eq!(service.cleanup_expired_states(), 2);
        assert!(service.state_manager().contains(&fresh.state));
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_sweeper_removes_expired() {
        let (service, clock) = service_with_clock();
        service.get_authorization_url("github", &[], REDIRECT).unwrap();
        clock.advance(chrono::Duration::minutes(11));

        let handle = service.spawn_state_sweeper(Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(90)).await;
        tokio::task::yield_now().await;

        assert!(service.state_manager().is_empty());
        handle.abort();
    }

    #[test]
    fn test_from_config() {
        let mut config = OAuthConfig::default();
        config.gitlab = Some(crate::config::ProviderSettings::new("gl", "secret"));
        let service = OAuthService::from_config(&config).unwrap();
        assert_eq!(service.get_available_providers(), vec!["gitlab"]);
        assert_eq!(service.state_manager().ttl(), chrono::Duration::minutes(10));
    }
}
