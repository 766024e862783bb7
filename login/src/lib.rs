#![deny(clippy::unwrap_used, clippy::expect_used)]

mod oauth;
mod session;
mod session_store;
mod token_provider;

pub use oauth::GoogleTokenProvider;
pub use oauth::ProviderConfig;
pub use session::AuthKind;
pub use session::SessionManager;
pub use session::SessionPhase;
pub use session_store::SessionDotJson;
pub use session_store::get_session_file;
pub use session_store::remove_session_json;
pub use session_store::try_read_session_json;
pub use session_store::write_session_json;
pub use token_provider::SessionError;
pub use token_provider::TokenGrant;
pub use token_provider::TokenProvider;
pub use token_provider::UserProfile;
