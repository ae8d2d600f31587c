//! Shared fixtures: providers pointed at a local mock identity provider

#![allow(dead_code)]

use std::sync::Arc;

use repoauth_core::{
    models::{OAuthProvider, ProviderConfig, ProviderEndpoints},
    oauth2::{create_provider, HttpClientConfig, Provider},
    ManualClock, OAuthService, ProviderRegistry, StateManager,
};
use wiremock::MockServer;

pub const CLIENT_ID: &str = "client-id";
pub const CLIENT_SECRET: &str = "client-secret";
pub const REDIRECT: &str = "https://app.example.com/auth/callback";

pub fn provider_config(kind: OAuthProvider, server: &MockServer) -> ProviderConfig {
    ProviderConfig::new(kind, CLIENT_ID, CLIENT_SECRET)
        .unwrap()
        .with_endpoints(ProviderEndpoints::with_base_url(kind, &server.uri()))
}

pub fn provider_with(kind: OAuthProvider, server: &MockServer, http: &HttpClientConfig) -> Arc<dyn Provider> {
    create_provider(provider_config(kind, server), http).unwrap()
}

pub fn provider(kind: OAuthProvider, server: &MockServer) -> Arc<dyn Provider> {
    provider_with(kind, server, &HttpClientConfig::default())
}

/// Service with every provider registered against `server` and a manual clock
pub fn service(server: &MockServer) -> (OAuthService, ManualClock) {
    let registry = ProviderRegistry::new();
    for kind in OAuthProvider::ALL {
        registry.register(provider(kind, server));
    }
    let clock = ManualClock::default();
    let states = StateManager::with_clock(chrono::Duration::minutes(10), Arc::new(clock.clone()));
    (OAuthService::new(registry, states), clock)
}

pub fn token_body(access_token: &str) -> serde_json::Value {
    serde_json::json!({
        "access_token": access_token,
        "token_type": "Bearer",
        "scope": "read_user",
        "refresh_token": format!("{access_token}-refresh"),
        "expires_in": 7200,
    })
}
