use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::AuthError;

/// Monotonic counter incremented on every access-token change
/// (sign-in, successful refresh, sign-out).
///
/// Caches keyed by the version never outlive the token they were computed
/// against: a version bump makes the old keys unreachable without any
/// explicit purge.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SessionVersion(pub u64);

impl SessionVersion {
    pub(crate) fn bump(&mut self) {
        self.0 += 1;
    }
}

impl std::fmt::Display for SessionVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// The authenticated identity associated with the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub name: String,
    pub email: String,
}

/// Coarse session standing, derived from the token material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Initial state, before the first identity-provider event arrives.
    Loading,
    Unauthenticated,
    Authenticated,
    /// A refresh attempt failed; the last-known token is retained for
    /// error reporting until an explicit logout.
    Error,
}

/// Fresh token material issued by the identity provider.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_at: OffsetDateTime,
    /// Rotated refresh token, when the provider issues one. `None` keeps
    /// the previously stored refresh token.
    pub refresh_token: Option<String>,
}

/// Events delivered by the identity provider, in a fixed vocabulary that
/// decouples [`TokenStore`](crate::TokenStore) from any particular
/// provider's callback mechanism.
#[derive(Debug, Clone)]
pub enum IdentityEvent {
    SignedIn {
        grant: TokenGrant,
        principal: Principal,
    },
    SignedOut,
    RefreshFailed {
        reason: String,
    },
}

/// Immutable view of the live session at one point in time.
///
/// Invariants: `Authenticated` implies `access_token` is present;
/// `Unauthenticated` implies it is absent.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub access_token: Option<String>,
    pub access_token_expires_at: Option<OffsetDateTime>,
    pub refresh_token: Option<String>,
    pub last_error: Option<AuthError>,
    pub principal: Option<Principal>,
    pub version: SessionVersion,
}

impl SessionSnapshot {
    /// The pristine pre-first-event session.
    pub(crate) fn initial() -> Self {
        Self {
            status: SessionStatus::Loading,
            access_token: None,
            access_token_expires_at: None,
            refresh_token: None,
            last_error: None,
            principal: None,
            version: SessionVersion::default(),
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self.status, SessionStatus::Authenticated)
    }

    /// True when the access token is stamped as expired at `now`.
    /// A missing expiry means the token never expires on its own.
    #[must_use]
    pub fn token_expired(&self, now: OffsetDateTime) -> bool {
        self.access_token_expires_at.is_some_and(|at| at <= now)
    }
}

/// Scope set normalized for cache keying: sorted and deduplicated, so the
/// identical permission query with scopes in a different order hits the
/// same cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ScopeSet(Vec<String>);

impl ScopeSet {
    pub fn new<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut scopes: Vec<String> = scopes.into_iter().map(Into::into).collect();
        scopes.sort();
        scopes.dedup();
        Self(scopes)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.join(" "))
    }
}
