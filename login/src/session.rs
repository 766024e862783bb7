//! The session manager owns the access token: it adopts a persisted session
//! on startup, renews it proactively ahead of expiry, recovers silently
//! after a remote 401, and clears everything on logout. Token-exchange
//! failures are retained for display and never escalate to a panic.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;
use tokio::task::JoinHandle;

use crate::session_store::SessionDotJson;
use crate::session_store::get_session_file;
use crate::session_store::remove_session_json;
use crate::session_store::try_read_session_json;
use crate::session_store::write_session_json;
use crate::token_provider::SessionError;
use crate::token_provider::TokenGrant;
use crate::token_provider::TokenProvider;
use crate::token_provider::UserProfile;

/// Proactive renewal fires this long before the token expires.
const RENEWAL_LEAD_SECS: i64 = 5 * 60;

/// A silent refresh that has not produced a provider response within this
/// bound is abandoned and the session falls back to unauthenticated.
const SILENT_REFRESH_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthKind {
    Silent,
    Interactive,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionPhase {
    #[default]
    Unauthenticated,
    Authenticating(AuthKind),
    Authenticated,
    /// Still authenticated, but a renewal of the expiring token is in
    /// flight.
    Expiring,
}

#[derive(Default)]
struct SessionState {
    phase: SessionPhase,
    access_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    profile: Option<UserProfile>,
    pending_silent_refresh: bool,
    last_error: Option<String>,
}

struct SessionInner {
    home: PathBuf,
    provider: Arc<dyn TokenProvider>,
    state: Mutex<SessionState>,
    renewal: Mutex<Option<JoinHandle<()>>>,
}

/// Cheap to clone; all clones share one session. The state mutex is only
/// held across synchronous sections, never across an await.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

impl SessionManager {
    pub fn new(home: PathBuf, provider: Arc<dyn TokenProvider>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                home,
                provider,
                state: Mutex::new(SessionState::default()),
                renewal: Mutex::new(None),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        match self.inner.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Adopt whatever `session.json` holds. A token with a future expiry is
    /// used directly without touching the network; an expired token gets one
    /// bounded silent refresh; anything else leaves the session
    /// unauthenticated. The cached profile is adopted in every case so the
    /// user stays visible while signing back in.
    pub async fn init(&self) {
        let session_file = get_session_file(&self.inner.home);
        let persisted = match try_read_session_json(&session_file) {
            Ok(persisted) => persisted,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return,
            Err(err) => {
                tracing::warn!("failed to load persisted session: {err}");
                self.state().last_error = Some(format!("failed to load persisted session: {err}"));
                return;
            }
        };

        let expired = {
            let mut st = self.state();
            st.profile = persisted.profile;
            match (persisted.access_token, persisted.token_expiry) {
                (Some(token), Some(expiry)) if expiry > Utc::now() => {
                    st.access_token = Some(token);
                    st.expires_at = Some(expiry);
                    st.phase = SessionPhase::Authenticated;
                    tracing::info!("adopted persisted session, expires at {expiry}");
                    drop(st);
                    self.schedule_renewal(expiry);
                    return;
                }
                (Some(_), _) => true,
                _ => false,
            }
        };

        if expired {
            tracing::info!("persisted token expired, attempting silent refresh");
            let _ = self.refresh().await;
        }
    }

    /// Interactive sign-in. Fetching the profile afterwards is best-effort;
    /// a userinfo failure is logged and the session stays authenticated.
    pub async fn login(&self) -> Result<(), SessionError> {
        {
            let mut st = self.state();
            st.phase = SessionPhase::Authenticating(AuthKind::Interactive);
            st.last_error = None;
        }
        let grant = match self.inner.provider.request_token(true).await {
            Ok(grant) => grant,
            Err(err) => return Err(self.record_failure(err)),
        };
        let profile = match self.inner.provider.fetch_profile(&grant.access_token).await {
            Ok(profile) => Some(profile),
            Err(err) => {
                tracing::warn!("could not fetch user profile: {err}");
                None
            }
        };
        self.adopt_grant(grant, profile);
        Ok(())
    }

    /// Best-effort revoke, then unconditionally drop in-memory and persisted
    /// session state.
    pub async fn logout(&self) {
        let token = self.state().access_token.clone();
        if let Some(token) = token
            && let Err(err) = self.inner.provider.revoke(&token).await
        {
            tracing::warn!("token revocation failed: {err}");
        }
        self.cancel_renewal();
        *self.state() = SessionState::default();
        if let Err(err) = remove_session_json(&self.inner.home) {
            tracing::warn!("failed to remove persisted session: {err}");
        }
    }

    /// Silent token renewal, used both by the proactive timer and as 401
    /// recovery. Only one attempt may be pending at a time; a re-entrant
    /// call while one is in flight returns immediately without a second
    /// provider request.
    pub async fn refresh(&self) -> Result<(), SessionError> {
        {
            let mut st = self.state();
            if st.pending_silent_refresh {
                tracing::debug!("silent refresh already pending, skipping");
                return Ok(());
            }
            st.pending_silent_refresh = true;
            st.phase = match st.phase {
                SessionPhase::Authenticated => SessionPhase::Expiring,
                _ => SessionPhase::Authenticating(AuthKind::Silent),
            };
        }

        let outcome = tokio::time::timeout(
            SILENT_REFRESH_TIMEOUT,
            self.inner.provider.request_token(false),
        )
        .await;
        match outcome {
            Ok(Ok(grant)) => {
                self.adopt_grant(grant, None);
                Ok(())
            }
            Ok(Err(err)) => Err(self.record_failure(err)),
            Err(_) => Err(self.record_failure(SessionError::RefreshTimeout)),
        }
    }

    /// Abort the proactive-renewal task. Call on shutdown.
    pub fn dispose(&self) {
        self.cancel_renewal();
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(
            self.state().phase,
            SessionPhase::Authenticated | SessionPhase::Expiring
        )
    }

    pub fn phase(&self) -> SessionPhase {
        self.state().phase
    }

    pub fn current_user(&self) -> Option<UserProfile> {
        self.state().profile.clone()
    }

    pub fn session_error(&self) -> Option<String> {
        self.state().last_error.clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.state().access_token.clone()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.state().expires_at
    }

    /// Install a fresh grant: update in-memory state, persist the three
    /// session entries together, and reschedule proactive renewal. When
    /// `profile` is `None` the cached one is kept.
    fn adopt_grant(&self, grant: TokenGrant, profile: Option<UserProfile>) {
        let expires_at = Utc::now() + chrono::Duration::seconds(grant.expires_in as i64);
        let persisted = {
            let mut st = self.state();
            st.access_token = Some(grant.access_token);
            st.expires_at = Some(expires_at);
            if let Some(profile) = profile {
                st.profile = Some(profile);
            }
            st.phase = SessionPhase::Authenticated;
            st.pending_silent_refresh = false;
            st.last_error = None;
            SessionDotJson {
                access_token: st.access_token.clone(),
                token_expiry: st.expires_at,
                profile: st.profile.clone(),
            }
        };
        let session_file = get_session_file(&self.inner.home);
        if let Err(err) = write_session_json(&session_file, &persisted) {
            tracing::warn!("failed to persist session: {err}");
        }
        self.schedule_renewal(expires_at);
    }

    /// Exchange failed: retain the message for display, drop the token, keep
    /// the cached profile visible.
    fn record_failure(&self, err: SessionError) -> SessionError {
        tracing::warn!("token exchange failed: {err}");
        let mut st = self.state();
        st.access_token = None;
        st.expires_at = None;
        st.phase = SessionPhase::Unauthenticated;
        st.pending_silent_refresh = false;
        st.last_error = Some(err.to_string());
        drop(st);
        err
    }

    fn schedule_renewal(&self, expires_at: DateTime<Utc>) {
        let delay = (expires_at - chrono::Duration::seconds(RENEWAL_LEAD_SECS) - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        // The task holds only a weak reference so a dropped manager is not
        // kept alive by its own timer.
        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                tracing::debug!("proactive token renewal");
                let _ = SessionManager { inner }.refresh().await;
            }
        });
        if let Some(old) = self.replace_renewal(Some(handle)) {
            old.abort();
        }
    }

    fn cancel_renewal(&self) {
        if let Some(handle) = self.replace_renewal(None) {
            handle.abort();
        }
    }

    fn replace_renewal(&self, handle: Option<JoinHandle<()>>) -> Option<JoinHandle<()>> {
        let mut slot = match self.inner.renewal.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *slot, handle)
    }
}

impl quadrant_api::TokenSource for SessionManager {
    fn access_token(&self) -> Option<String> {
        SessionManager::access_token(self)
    }
}
