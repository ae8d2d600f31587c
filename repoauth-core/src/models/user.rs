//! Normalized profile data fetched from an identity provider

use serde::{Deserialize, Serialize};

use crate::models::OAuthProvider;
use crate::{Error, Result};

/// Profile of the authenticated account
///
/// Built fresh on every call, never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    /// Provider-native account id
    pub id: String,
    pub username: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub profile_url: Option<String>,
    pub provider: OAuthProvider,
    /// Verbatim provider payload, kept for audit/debugging
    pub raw_data: serde_json::Value,
}

/// Email address attached to a provider account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawUserEmail")]
pub struct UserEmail {
    pub email: String,
    pub primary: bool,
    pub verified: bool,
    pub visibility: Option<String>,
}

#[derive(Deserialize)]
struct RawUserEmail {
    email: String,
    #[serde(default)]
    primary: bool,
    #[serde(default)]
    verified: bool,
    #[serde(default)]
    visibility: Option<String>,
}

impl TryFrom<RawUserEmail> for UserEmail {
    type Error = Error;

    fn try_from(raw: RawUserEmail) -> Result<Self> {
        Ok(Self::new(raw.email)?
            .with_primary(raw.primary)
            .with_verified(raw.verified)
            .with_visibility(raw.visibility))
    }
}

impl UserEmail {
    /// Lowercases the address
    ///
    /// # Errors
    /// Returns `Error::InvalidInput` if the address has no `@`.
    pub fn new(email: impl AsRef<str>) -> Result<Self> {
        let email = email.as_ref().trim().to_lowercase();
        if !email.contains('@') {
            return Err(Error::InvalidInput(format!("Invalid email address: {email}")));
        }
        Ok(Self {
            email,
            primary: false,
            verified: false,
            visibility: None,
        })
    }

    #[must_use]
    pub const fn with_primary(mut self, primary: bool) -> Self {
        self.primary = primary;
        self
    }

    #[must_use]
    pub const fn with_verified(mut self, verified: bool) -> Self {
        self.verified = verified;
        self
    }

    #[must_use]
    pub fn with_visibility(mut self, visibility: Option<String>) -> Self {
        self.visibility = visibility;
        self
    }
}
