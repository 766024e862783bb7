use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The OAuth provider rejected or failed the exchange, or persisted
    /// session state could not be loaded.
    #[error("token exchange failed: {0}")]
    Exchange(String),
    /// The silent refresh produced no response within the allowed bound.
    #[error("silent refresh timed out")]
    RefreshTimeout,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A freshly issued access token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    /// Seconds until expiry, as reported by the provider.
    pub expires_in: u64,
}

/// Profile as the OAuth userinfo endpoint reports it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, rename = "picture", skip_serializing_if = "Option::is_none")]
    pub picture_url: Option<String>,
}

/// Capability interface over the OAuth provider. The production
/// implementation talks to Google; tests substitute a deterministic fake
/// that resolves, rejects, or never answers.
#[async_trait::async_trait]
pub trait TokenProvider: Send + Sync {
    /// Obtain a new access token. An interactive grant may open a browser
    /// and wait on the user; a non-interactive grant must complete without
    /// user action (`prompt=none` semantics) or fail.
    async fn request_token(&self, interactive: bool) -> Result<TokenGrant, SessionError>;

    /// Revoke `token` with the provider.
    async fn revoke(&self, token: &str) -> Result<(), SessionError>;

    /// Fetch the profile belonging to `access_token`.
    async fn fetch_profile(&self, access_token: &str) -> Result<UserProfile, SessionError>;
}
