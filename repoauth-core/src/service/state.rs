//! CSRF state bookkeeping
//!
//! Issued state tokens live in process memory only. They do not survive a
//! restart and are not shared between replicas, so a callback must reach
//! the instance that issued the authorization URL.
//!
//! Expired entries are evicted lazily on access and by
//! [`StateManager::cleanup_expired_states`].

use chrono::Duration;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::{
    clock::{Clock, SystemClock},
    models::{OAuthProvider, OAuthState, DEFAULT_STATE_TTL_SECS},
    Error, Result,
};

/// Default number of random bytes behind a state token
pub const DEFAULT_STATE_LENGTH: usize = 32;

#[derive(Debug, Clone)]
pub struct StateManager {
    states: Arc<DashMap<String, OAuthState>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl StateManager {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            states: Arc::new(DashMap::new()),
            ttl,
            clock,
        }
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// URL-safe random token carrying at least `length` bytes of entropy
    ///
    /// A `length` of zero falls back to [`DEFAULT_STATE_LENGTH`].
    #[must_use]
    pub fn generate_state(length: usize) -> String {
        let length = if length == 0 { DEFAULT_STATE_LENGTH } else { length };
        // 6 bits per character of the URL-safe alphabet
        let chars = (length * 8).div_ceil(6);
        nanoid::nanoid!(chars)
    }

    /// Store a pending authorization request, replacing any entry with the same token
    ///
    /// # Errors
    /// `Error::InvalidInput` if `state`, `provider` or `redirect_uri` is empty or
    /// `provider` is not a supported identity provider.
    pub fn store_state(
        &self,
        state: &str,
        provider: &str,
        redirect_uri: &str,
        scopes: Option<Vec<String>>,
        metadata: Option<HashMap<String, String>>,
    ) -> Result<()> {
        if state.trim().is_empty() {
            return Err(Error::InvalidInput("state must not be empty".to_string()));
        }
        if provider.trim().is_empty() {
            return Err(Error::InvalidInput("provider must not be empty".to_string()));
        }
        if redirect_uri.trim().is_empty() {
            return Err(Error::InvalidInput("redirect_uri must not be empty".to_string()));
        }
        let provider = OAuthProvider::parse(provider)
            .ok_or_else(|| Error::InvalidInput(format!("Unsupported provider: {provider}")))?;

        let entry = OAuthState {
            state: state.to_string(),
            provider,
            redirect_uri: redirect_uri.to_string(),
            scopes: scopes.unwrap_or_default(),
            metadata: metadata.unwrap_or_default(),
            created_at: self.clock.now(),
        };
        self.states.insert(state.to_string(), entry);

        debug!(provider = %provider, "Stored OAuth state");
        Ok(())
    }

    /// Drop `state` if it has outlived the TTL. Returns true when evicted.
    fn evict_if_expired(&self, state: &str) -> bool {
        let now = self.clock.now();
        let ttl = self.ttl;
        let evicted = self
            .states
            .remove_if(state, |_, entry| entry.is_expired_at(now, ttl))
            .is_some();
        if evicted {
            debug!("Evicted expired OAuth state");
        }
        evicted
    }

    /// True only for a live entry issued for `provider` (case-insensitive)
    pub fn validate_state(&self, state: &str, provider: &str) -> bool {
        if self.evict_if_expired(state) {
            return false;
        }
        let provider = provider.trim();
        self.states
            .get(state)
            .is_some_and(|entry| entry.provider.as_str().eq_ignore_ascii_case(provider))
    }

    /// Atomically check and remove a state for the callback that completes it
    ///
    /// Of several concurrent callers presenting the same token, at most one
    /// gets the entry back.
    ///
    /// # Errors
    /// `Error::InvalidState` if the entry is missing, expired, or was issued for a
    /// different provider or redirect URI.
    pub fn consume_state(&self, state: &str, provider: &str, redirect_uri: &str) -> Result<OAuthState> {
        let now = self.clock.now();
        let ttl = self.ttl;
        let provider = provider.trim();
        let mut expired = false;

        let removed = self.states.remove_if(state, |_, entry| {
            if entry.is_expired_at(now, ttl) {
                expired = true;
                return true;
            }
            entry.provider.as_str().eq_ignore_ascii_case(provider)
                && entry.redirect_uri == redirect_uri
        });

        match removed {
            Some((_, entry)) if !expired => Ok(entry),
            Some(_) => {
                debug!(provider = %provider, "OAuth state expired before callback");
                Err(Error::InvalidState("state expired".to_string()))
            }
            None => Err(Error::InvalidState(
                "state not found or does not match the request".to_string(),
            )),
        }
    }

    /// Put back an entry taken by [`consume_state`](Self::consume_state)
    ///
    /// The original `created_at` is kept, so the entry still expires on schedule.
    pub fn restore_state(&self, entry: OAuthState) {
        self.states.entry(entry.state.clone()).or_insert(entry);
    }

    /// Caller-supplied metadata of a live state
    ///
    /// # Errors
    /// `Error::StateNotFound` if unknown, `Error::StateExpired` (after evicting it)
    /// if the TTL has elapsed.
    pub fn get_state_metadata(&self, state: &str) -> Result<HashMap<String, String>> {
        if self.evict_if_expired(state) {
            return Err(Error::StateExpired(state.to_string()));
        }
        self.states
            .get(state)
            .map(|entry| entry.metadata.clone())
            .ok_or_else(|| Error::StateNotFound(state.to_string()))
    }

    /// Full record of a live state; `None` if missing or expired
    pub fn get_state_data(&self, state: &str) -> Option<OAuthState> {
        if self.evict_if_expired(state) {
            return None;
        }
        self.states.get(state).map(|entry| entry.clone())
    }

    pub fn remove_state(&self, state: &str) -> bool {
        self.states.remove(state).is_some()
    }

    /// Evict every expired entry, returning how many were removed
    pub fn cleanup_expired_states(&self) -> usize {
        let now = self.clock.now();
        let ttl = self.ttl;
        let before = self.states.len();
        let mut removed = 0usize;
        self.states.retain(|_, entry| {
            let keep = !entry.is_expired_at(now, ttl);
            if !keep {
                removed += 1;
            }
            keep
        });

        if removed > 0 {
            debug!(removed, remaining = before.saturating_sub(removed), "Cleaned up expired OAuth states");
        }
        removed
    }

    /// Snapshot of live states (expired ones are pruned first)
    pub fn get_all_states(&self) -> HashMap<String, OAuthState> {
        self.cleanup_expired_states();
        self.states
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Drop everything, returning the number of entries held before
    pub fn clear_all_states(&self) -> usize {
        let count = self.states.len();
        self.states.clear();
        count
    }

    /// Number of stored entries, including expired ones not yet evicted
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Membership test; expired entries do not count
    #[must_use]
    pub fn contains(&self, state: &str) -> bool {
        let now = self.clock.now();
        self.states
            .get(state)
            .is_some_and(|entry| !entry.is_expired_at(now, self.ttl))
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_STATE_TTL_SECS))
    }
}
