//! CSRF state records for the authorization-code flow

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::OAuthProvider;

/// Default lifetime of an issued state token
pub const DEFAULT_STATE_TTL_SECS: i64 = 600;

/// `now - created_at > ttl`
#[must_use]
pub fn is_expired(created_at: DateTime<Utc>, now: DateTime<Utc>, ttl: Duration) -> bool {
    now.signed_duration_since(created_at) > ttl
}

/// Pending authorization request, keyed by its state token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthState {
    pub state: String,
    pub provider: OAuthProvider,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl OAuthState {
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        is_expired(self.created_at, now, ttl)
    }
}

/// Result of issuing an authorization URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUrlResponse {
    pub auth_url: String,
    pub provider: String,
    pub state: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_expired_boundary() {
        let created = Utc::now();
        let ttl = Duration::seconds(DEFAULT_STATE_TTL_SECS);
        assert!(!is_expired(created, created, ttl));
        assert!(!is_expired(created, created + ttl, ttl));
        assert!(is_expired(created, created + ttl + Duration::seconds(1), ttl));
    }
}
