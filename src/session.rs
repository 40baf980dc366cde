use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::error::AuthError;
use crate::provider::{InteractiveAuth, TokenRefresher};
use crate::token_store::TokenStore;
use crate::types::{IdentityEvent, SessionStatus, SessionVersion};

/// Coarse session status plus the `login()`/`logout()` triggers.
///
/// Status is derived from [`TokenStore`]; this component never holds state
/// of its own beyond the login gate. Transitions:
/// `loading -> {authenticated, unauthenticated}`,
/// `authenticated -> {unauthenticated, error}`,
/// `error -> {authenticated, unauthenticated}`,
/// `unauthenticated -> authenticated`. The session outlives individual
/// page views; there is no terminal state.
pub struct SessionStateMachine<R, A> {
    store: Arc<TokenStore<R>>,
    auth: Arc<A>,
    login_gate: LoginGate,
}

impl<R: TokenRefresher, A: InteractiveAuth> SessionStateMachine<R, A> {
    #[must_use]
    pub fn new(store: Arc<TokenStore<R>>, auth: A) -> Self {
        Self {
            store,
            auth: Arc::new(auth),
            login_gate: LoginGate::default(),
        }
    }

    /// Current coarse status.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.store.current().status
    }

    /// Trigger the provider's interactive login flow unconditionally.
    /// Suspends until the provider hands control back; does not retry.
    ///
    /// # Errors
    ///
    /// Propagates the provider's failure.
    pub async fn login(&self) -> Result<(), AuthError> {
        tracing::info!("interactive login triggered");
        self.auth.begin_login().await
    }

    /// Boundary-side login trigger: fires the interactive flow at most once
    /// per `(path, session-version)` unauthenticated transition, so the
    /// check can safely run on every re-render.
    ///
    /// Returns `true` when a login flow was actually started.
    ///
    /// # Errors
    ///
    /// Propagates the provider's failure. The gate stays consumed: a failed
    /// trigger is not repeated until the next transition.
    pub async fn login_if_unauthenticated(&self, path: &str) -> Result<bool, AuthError> {
        let session = self.store.current();
        if session.status != SessionStatus::Unauthenticated {
            return Ok(false);
        }
        if !self.login_gate.try_acquire(path, session.version) {
            return Ok(false);
        }
        self.login().await?;
        Ok(true)
    }

    /// Provider sign-out, then clear the store to `unauthenticated`.
    ///
    /// A provider-side sign-out failure is logged but does not keep the
    /// local session alive.
    pub async fn logout(&self) {
        if let Err(e) = self.auth.begin_logout().await {
            tracing::warn!(error = %e, "provider sign-out failed, clearing local session anyway");
        }
        self.store.apply_identity_event(IdentityEvent::SignedOut);
    }
}

/// Generation marker preventing duplicate interactive login triggers.
///
/// One trigger per `(path, session version)` pair, however many times the
/// boundary check re-runs. Only the current version's paths are retained;
/// a version advance starts a fresh generation and drops the old entries.
#[derive(Default)]
struct LoginGate {
    seen: Mutex<(SessionVersion, HashSet<String>)>,
}

impl LoginGate {
    fn try_acquire(&self, path: &str, version: SessionVersion) -> bool {
        let mut seen = self.seen.lock().expect("login gate lock poisoned");
        if seen.0 != version {
            seen.0 = version;
            seen.1.clear();
        }
        seen.1.insert(path.to_string())
    }
}
