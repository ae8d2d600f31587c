// Provider Registry
//
// Maps each identity provider to its shared implementation instance

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use super::{create_provider, Provider};
use crate::{config::OAuthConfig, models::OAuthProvider, Error, Result};

/// Registry of configured identity providers
///
/// Explicit state owned by the service rather than a process global.
/// Mutated at startup (and in test teardown); request handling only reads.
/// Clones share the same underlying map.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Arc<RwLock<BTreeMap<OAuthProvider, Arc<dyn Provider>>>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.providers())
            .finish()
    }
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and register every enabled provider in `config`
    ///
    /// Returns the number of providers registered.
    ///
    /// # Errors
    /// `Error::Configuration` if an enabled provider has invalid settings;
    /// nothing is registered in that case.
    pub fn init(&self, config: &OAuthConfig) -> Result<usize> {
        let http = config.http_client_config();
        let mut built = Vec::new();

        for kind in OAuthProvider::ALL {
            let Some(settings) = config.provider_settings(kind) else {
                continue;
            };
            if !settings.enabled {
                info!(provider = %kind, "OAuth provider disabled in configuration");
                continue;
            }
            built.push(create_provider(settings.to_provider_config(kind)?, &http)?);
        }

        let count = built.len();
        for provider in built {
            self.register(provider);
        }
        Ok(count)
    }

    /// Register a provider, replacing any previous instance of the same kind
    pub fn register(&self, provider: Arc<dyn Provider>) -> Option<Arc<dyn Provider>> {
        let kind = provider.provider();
        let previous = self.providers.write().insert(kind, provider);
        info!(provider = %kind, replaced = previous.is_some(), "Registered OAuth provider");
        previous
    }

    /// Look up a provider by identifier (case-insensitive)
    ///
    /// # Errors
    /// `Error::ProviderNotFound` for unknown or unregistered identifiers.
    pub fn get(&self, provider: &str) -> Result<Arc<dyn Provider>> {
        OAuthProvider::parse(provider)
            .and_then(|kind| self.get_by_kind(kind))
            .ok_or_else(|| Error::ProviderNotFound(provider.to_string()))
    }

    #[must_use]
    pub fn get_by_kind(&self, kind: OAuthProvider) -> Option<Arc<dyn Provider>> {
        self.providers.read().get(&kind).cloned()
    }

    #[must_use]
    pub fn contains(&self, provider: &str) -> bool {
        OAuthProvider::parse(provider).is_some_and(|kind| self.providers.read().contains_key(&kind))
    }

    /// Registered providers in a stable order
    #[must_use]
    pub fn providers(&self) -> Vec<OAuthProvider> {
        self.providers.read().keys().copied().collect()
    }

    pub fn unregister(&self, kind: OAuthProvider) -> bool {
        self.providers.write().remove(&kind).is_some()
    }

    /// Remove every provider, returning how many were registered
    pub fn clear(&self) -> usize {
        let mut providers = self.providers.write();
        let count = providers.len();
        providers.clear();
        count
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderSettings;
    use crate::models::ProviderConfig;
    use crate::oauth2::HttpClientConfig;

    fn provider(kind: OAuthProvider) -> Arc<dyn Provider> {
        let config = ProviderConfig::new(kind, "id", "secret").unwrap();
        create_provider(config, &HttpClientConfig::default()).unwrap()
    }

    #[test]
    fn test_register_and_get() {
        let registry = ProviderRegistry::new();
        assert!(registry.register(provider(OAuthProvider::GitHub)).is_none());
        assert!(registry.register(provider(OAuthProvider::GitHub)).is_some());

        assert_eq!(registry.get("GitHub").unwrap().provider(), OAuthProvider::GitHub);
        assert!(registry.contains("github"));
        assert!(matches!(registry.get("gitlab"), Err(Error::ProviderNotFound(_))));
        assert!(matches!(registry.get("unknown"), Err(Error::ProviderNotFound(_))));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_providers_sorted_and_clear() {
        let registry = ProviderRegistry::new();
        registry.register(provider(OAuthProvider::Bitbucket));
        registry.register(provider(OAuthProvider::GitHub));
        assert_eq!(
            registry.providers(),
            vec![OAuthProvider::GitHub, OAuthProvider::Bitbucket]
        );

        assert!(registry.unregister(OAuthProvider::GitHub));
        assert!(!registry.unregister(OAuthProvider::GitHub));
        assert_eq!(registry.clear(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_clones_share_state() {
        let registry = ProviderRegistry::new();
        let other = registry.clone();
        other.register(provider(OAuthProvider::GitLab));
        assert!(registry.contains("gitlab"));
    }

    #[test]
    fn test_init_from_config() {
        let mut config = OAuthConfig::default();
        config.github = Some(ProviderSettings::new("gh", "secret"));
        let mut gitlab = ProviderSettings::new("gl", "secret");
        gitlab.enabled = false;
        config.gitlab = Some(gitlab);

        let registry = ProviderRegistry::new();
        assert_eq!(registry.init(&config).unwrap(), 1);
        assert_eq!(registry.providers(), vec![OAuthProvider::GitHub]);
    }

    #[test]
    fn test_init_rejects_invalid_settings_atomically() {
        let mut config = OAuthConfig::default();
        config.github = Some(ProviderSettings::new("gh", "secret"));
        config.bitbucket = Some(ProviderSettings::new("", "secret"));

        let registry = ProviderRegistry::new();
        assert!(matches!(registry.init(&config), Err(Error::Configuration(_))));
        assert!(registry.is_empty());
    }
}
