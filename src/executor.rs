use std::future::Future;
use std::sync::Arc;

use time::OffsetDateTime;

use crate::error::{AuthError, RequestFailure};
use crate::provider::TokenRefresher;
use crate::token_store::TokenStore;

/// Wraps an arbitrary network call with token injection, expiry-aware
/// pre-flight refresh, and a single refresh + retry when the server rejects
/// the token mid-request.
///
/// Guarantee: at most one implicit refresh attempt and at most two network
/// round-trips per logical call, no matter how often the server signals
/// token invalidity.
pub struct AuthorizedRequestExecutor<R> {
    store: Arc<TokenStore<R>>,
}

impl<R> Clone for AuthorizedRequestExecutor<R> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<R: TokenRefresher> AuthorizedRequestExecutor<R> {
    #[must_use]
    pub fn new(store: Arc<TokenStore<R>>) -> Self {
        Self { store }
    }

    /// Build and send a request with the current access token.
    ///
    /// `send` receives the token and performs one round-trip; it may be
    /// invoked a second time with a rotated token if the first attempt is
    /// rejected as unauthorized.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Unauthenticated`] when no authenticated session exists.
    /// - [`AuthError::TokenRefreshFailed`] when an implicit refresh is
    ///   needed and the provider rejects it.
    /// - [`AuthError::TokenExpired`] when the server rejects the token even
    ///   after the one permitted refresh; the boundary is expected to force
    ///   a re-login.
    /// - [`AuthError::RequestFailed`] for any other transport or server
    ///   failure, surfaced verbatim. Non-auth failures are never retried
    ///   here; that is the caller's concern.
    pub async fn execute<T, F, Fut>(&self, mut send: F) -> Result<T, AuthError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, RequestFailure>>,
    {
        let mut snapshot = self.store.current();
        if !snapshot.is_authenticated() {
            return Err(AuthError::Unauthenticated);
        }

        let mut refreshed = false;
        if snapshot.token_expired(OffsetDateTime::now_utc()) {
            snapshot = self.store.refresh().await?;
            refreshed = true;
        }

        let token = snapshot.access_token.ok_or(AuthError::Unauthenticated)?;
        match send(token).await {
            Ok(response) => Ok(response),
            Err(RequestFailure::TokenRejected) if !refreshed => {
                tracing::debug!("token rejected mid-request, refreshing and retrying once");
                let snapshot = self.store.refresh().await?;
                let token = snapshot.access_token.ok_or(AuthError::Unauthenticated)?;
                match send(token).await {
                    Ok(response) => Ok(response),
                    Err(RequestFailure::TokenRejected) => Err(AuthError::TokenExpired),
                    Err(failure) => Err(failure.into()),
                }
            }
            // The refresh budget for this call is already spent.
            Err(RequestFailure::TokenRejected) => Err(AuthError::TokenExpired),
            Err(failure) => Err(failure.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use time::Duration;

    use super::*;
    use crate::token_store::tests::{signed_in_event, FakeRefresher};
    use crate::types::{IdentityEvent, Principal, SessionVersion, TokenGrant};

    fn authenticated_store(refresher: FakeRefresher) -> Arc<TokenStore<FakeRefresher>> {
        let store = Arc::new(TokenStore::new(refresher));
        store.apply_identity_event(signed_in_event("at-1"));
        store
    }

    fn expired_signed_in_event(access_token: &str) -> IdentityEvent {
        IdentityEvent::SignedIn {
            grant: TokenGrant {
                access_token: access_token.to_string(),
                expires_at: OffsetDateTime::now_utc() - Duration::seconds(1),
                refresh_token: Some("rt-1".to_string()),
            },
            principal: Principal {
                id: "u-1".into(),
                name: "Test User".into(),
                email: "test@example.com".into(),
            },
        }
    }

    #[tokio::test]
    async fn fails_fast_when_not_authenticated() {
        let store = Arc::new(TokenStore::new(FakeRefresher::succeeding()));
        let executor = AuthorizedRequestExecutor::new(store);

        let sends = AtomicUsize::new(0);
        let err = executor
            .execute(|_token| {
                sends.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, RequestFailure>(()) }
            })
            .await
            .unwrap_err();

        assert_eq!(err, AuthError::Unauthenticated);
        assert_eq!(sends.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn sends_with_current_token() {
        let store = authenticated_store(FakeRefresher::succeeding());
        let executor = AuthorizedRequestExecutor::new(store.clone());

        let seen = executor
            .execute(|token| async move { Ok::<_, RequestFailure>(token) })
            .await
            .unwrap();

        assert_eq!(seen, "at-1");
        assert_eq!(store.refresher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_before_sending() {
        let store = Arc::new(TokenStore::new(FakeRefresher::succeeding()));
        store.apply_identity_event(expired_signed_in_event("at-stale"));
        let executor = AuthorizedRequestExecutor::new(store.clone());

        let seen = executor
            .execute(|token| async move { Ok::<_, RequestFailure>(token) })
            .await
            .unwrap();

        // Net one refresh, one request, zero user-visible errors.
        assert_eq!(seen, "at-refreshed-1");
        assert_eq!(store.refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn preflight_refresh_failure_is_terminal() {
        let store = Arc::new(TokenStore::new(FakeRefresher::failing()));
        store.apply_identity_event(expired_signed_in_event("at-stale"));
        let executor = AuthorizedRequestExecutor::new(store);

        let sends = AtomicUsize::new(0);
        let err = executor
            .execute(|_token| {
                sends.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, RequestFailure>(()) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::TokenRefreshFailed(_)));
        assert_eq!(sends.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejection_triggers_one_refresh_and_one_retry() {
        let store = authenticated_store(FakeRefresher::succeeding());
        let executor = AuthorizedRequestExecutor::new(store.clone());

        let sends = AtomicUsize::new(0);
        let result = executor
            .execute(|token| {
                let attempt = sends.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 0 {
                        Err(RequestFailure::TokenRejected)
                    } else {
                        Ok(token)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, "at-refreshed-1");
        assert_eq!(sends.load(Ordering::SeqCst), 2);
        assert_eq!(store.refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn persistent_rejection_becomes_token_expired() {
        let store = authenticated_store(FakeRefresher::succeeding());
        let executor = AuthorizedRequestExecutor::new(store.clone());

        let sends = AtomicUsize::new(0);
        let err = executor
            .execute(|_token| {
                sends.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(RequestFailure::TokenRejected) }
            })
            .await
            .unwrap_err();

        assert_eq!(err, AuthError::TokenExpired);
        // Exactly two round-trips and one refresh, then give up.
        assert_eq!(sends.load(Ordering::SeqCst), 2);
        assert_eq!(store.refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejection_after_preflight_refresh_does_not_refresh_again() {
        let store = Arc::new(TokenStore::new(FakeRefresher::succeeding()));
        store.apply_identity_event(expired_signed_in_event("at-stale"));
        let executor = AuthorizedRequestExecutor::new(store.clone());

        let sends = AtomicUsize::new(0);
        let err = executor
            .execute(|_token| {
                sends.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(RequestFailure::TokenRejected) }
            })
            .await
            .unwrap_err();

        assert_eq!(err, AuthError::TokenExpired);
        assert_eq!(sends.load(Ordering::SeqCst), 1);
        assert_eq!(store.refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transport_failure_is_surfaced_verbatim_without_retry() {
        let store = authenticated_store(FakeRefresher::succeeding());
        let executor = AuthorizedRequestExecutor::new(store.clone());

        let sends = AtomicUsize::new(0);
        let err = executor
            .execute(|_token| {
                sends.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<(), _>(RequestFailure::Transport {
                        status: Some(503),
                        message: "service unavailable".into(),
                    })
                }
            })
            .await
            .unwrap_err();

        assert_eq!(
            err,
            AuthError::RequestFailed {
                status: Some(503),
                message: "service unavailable".into(),
            }
        );
        assert_eq!(sends.load(Ordering::SeqCst), 1);
        assert_eq!(store.refresher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn retry_uses_rotated_token_and_version() {
        let store = authenticated_store(FakeRefresher::succeeding());
        let executor = AuthorizedRequestExecutor::new(store.clone());
        assert_eq!(store.version(), SessionVersion(1));

        let sends = AtomicUsize::new(0);
        executor
            .execute(|_token| {
                let attempt = sends.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 0 {
                        Err(RequestFailure::TokenRejected)
                    } else {
                        Ok(())
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(store.version(), SessionVersion(2));
    }
}
