pub mod oauth2;
pub mod state;

pub use self::oauth2::OAuthService;
pub use self::state::{StateManager, DEFAULT_STATE_LENGTH};
