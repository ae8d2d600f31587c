pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod oauth2;
pub mod service;

pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::config::Config;
pub use crate::error::{Error, Result};
pub use crate::models::{OAuthProvider, OAuthToken, UserEmail, UserInfo};
pub use crate::oauth2::{Provider, ProviderRegistry};
pub use crate::service::{OAuthService, StateManager};
