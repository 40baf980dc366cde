use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use crate::error::AuthError;
use crate::provider::TokenRefresher;
use crate::types::{IdentityEvent, SessionSnapshot, SessionStatus, SessionVersion, TokenGrant};

/// Exclusive owner of the live session.
///
/// All mutation goes through two entry points: [`apply_identity_event`]
/// for provider callbacks and [`refresh`] for the refresh-token grant.
/// Every access-token change bumps the [`SessionVersion`], which dependent
/// caches use as an invalidation key. Every mutation publishes the current
/// version on a watch channel for components that need to react to change.
///
/// Concurrent `refresh()` calls coalesce: one caller performs the grant
/// while the rest wait on the gate and then adopt its outcome, rotated
/// session and refusal alike.
///
/// [`apply_identity_event`]: TokenStore::apply_identity_event
/// [`refresh`]: TokenStore::refresh
pub struct TokenStore<R> {
    pub(crate) refresher: Arc<R>,
    session: Mutex<SessionSnapshot>,
    changed: watch::Sender<SessionVersion>,
    // Serializes refresh attempts and holds the last settled outcome;
    // callers that queued behind an attempt adopt its outcome instead of
    // re-issuing the grant.
    refresh_gate: tokio::sync::Mutex<Option<Result<SessionSnapshot, AuthError>>>,
    refresh_attempts: AtomicU64,
}

impl<R: TokenRefresher> TokenStore<R> {
    #[must_use]
    pub fn new(refresher: R) -> Self {
        let (changed, _) = watch::channel(SessionVersion::default());
        Self {
            refresher: Arc::new(refresher),
            session: Mutex::new(SessionSnapshot::initial()),
            changed,
            refresh_gate: tokio::sync::Mutex::new(None),
            refresh_attempts: AtomicU64::new(0),
        }
    }

    /// Current session snapshot. Never blocks on network work.
    #[must_use]
    pub fn current(&self) -> SessionSnapshot {
        self.session.lock().expect("session lock poisoned").clone()
    }

    /// Current session version.
    #[must_use]
    pub fn version(&self) -> SessionVersion {
        self.session.lock().expect("session lock poisoned").version
    }

    /// Subscribe to change notifications. The payload is the session
    /// version at publication time; a notification without a version bump
    /// means a status-only change (e.g. a failed refresh).
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionVersion> {
        self.changed.subscribe()
    }

    /// Consume one identity-provider event and transition the session.
    pub fn apply_identity_event(&self, event: IdentityEvent) {
        let version = {
            let mut session = self.session.lock().expect("session lock poisoned");
            match event {
                IdentityEvent::SignedIn { grant, principal } => {
                    apply_grant(&mut session, grant);
                    session.principal = Some(principal);
                    session.status = SessionStatus::Authenticated;
                    session.last_error = None;
                    tracing::info!(version = %session.version, "session signed in");
                }
                IdentityEvent::SignedOut => {
                    if session.access_token.is_some() {
                        session.version.bump();
                    }
                    session.access_token = None;
                    session.access_token_expires_at = None;
                    session.refresh_token = None;
                    session.principal = None;
                    session.last_error = None;
                    session.status = SessionStatus::Unauthenticated;
                    tracing::info!(version = %session.version, "session signed out");
                }
                IdentityEvent::RefreshFailed { reason } => {
                    // Token material is kept so in-flight requests can still
                    // observe the last-known state for error reporting.
                    session.status = SessionStatus::Error;
                    session.last_error = Some(AuthError::TokenRefreshFailed(reason.clone()));
                    tracing::warn!(reason = %reason, "identity provider reported refresh failure");
                }
            }
            session.version
        };
        self.changed.send_replace(version);
    }

    /// Obtain a new access token using the stored refresh token.
    ///
    /// On success the session is rotated and the version bumped. On failure
    /// the session degrades to [`SessionStatus::Error`] with
    /// `last_error = TokenRefreshFailed`, keeping the stale token until an
    /// explicit logout.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::TokenRefreshFailed`] when no refresh token is
    /// stored or the provider rejects the grant.
    pub async fn refresh(&self) -> Result<SessionSnapshot, AuthError> {
        let entered_version = self.version();
        let entered_attempt = self.refresh_attempts.load(Ordering::Acquire);
        let mut last_outcome = self.refresh_gate.lock().await;

        // An attempt settled while we queued; its outcome — success or
        // failure — covers this call.
        if self.refresh_attempts.load(Ordering::Acquire) != entered_attempt {
            if let Some(outcome) = last_outcome.clone() {
                return outcome;
            }
        }

        // The token was rotated by another path (e.g. a fresh sign-in)
        // while we queued.
        let snapshot = self.current();
        if snapshot.version != entered_version {
            return Ok(snapshot);
        }

        let outcome = match snapshot.refresh_token {
            Some(refresh_token) => match self.refresher.refresh(&refresh_token).await {
                Ok(grant) => {
                    let (version, snapshot) = {
                        let mut session = self.session.lock().expect("session lock poisoned");
                        apply_grant(&mut session, grant);
                        session.status = SessionStatus::Authenticated;
                        session.last_error = None;
                        (session.version, session.clone())
                    };
                    self.changed.send_replace(version);
                    tracing::debug!(version = %version, "access token refreshed");
                    Ok(snapshot)
                }
                Err(e) => {
                    let reason = match e {
                        AuthError::TokenRefreshFailed(reason) => reason,
                        other => other.to_string(),
                    };
                    Err(self.record_refresh_failure(&reason))
                }
            },
            None => Err(self.record_refresh_failure("no refresh token stored")),
        };

        self.refresh_attempts.fetch_add(1, Ordering::Release);
        *last_outcome = Some(outcome.clone());
        outcome
    }

    fn record_refresh_failure(&self, reason: &str) -> AuthError {
        let error = AuthError::TokenRefreshFailed(reason.to_string());
        let version = {
            let mut session = self.session.lock().expect("session lock poisoned");
            session.status = SessionStatus::Error;
            session.last_error = Some(error.clone());
            session.version
        };
        self.changed.send_replace(version);
        tracing::warn!(reason = %reason, "token refresh failed");
        error
    }
}

/// Install fresh token material, bumping the version. A grant without a
/// rotated refresh token keeps the stored one.
fn apply_grant(session: &mut SessionSnapshot, grant: TokenGrant) {
    session.access_token = Some(grant.access_token);
    session.access_token_expires_at = Some(grant.expires_at);
    if grant.refresh_token.is_some() {
        session.refresh_token = grant.refresh_token;
    }
    session.version.bump();
}
