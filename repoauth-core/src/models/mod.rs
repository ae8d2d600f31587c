pub mod provider;
pub mod state;
pub mod token;
pub mod user;

pub use provider::{OAuthProvider, ProviderConfig, ProviderEndpoints, PublicProviderConfig};
pub use state::{AuthUrlResponse, OAuthState, DEFAULT_STATE_TTL_SECS};
pub use token::OAuthToken;
pub use user::{UserEmail, UserInfo};
