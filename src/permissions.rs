use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use time::OffsetDateTime;
use tokio::sync::broadcast;

use crate::authz::AuthorizationBackend;
use crate::error::AuthError;
use crate::executor::AuthorizedRequestExecutor;
use crate::provider::TokenRefresher;
use crate::token_store::TokenStore;
use crate::types::{ScopeSet, SessionVersion};

/// Cache key: one permission query against one token generation.
///
/// Entries keyed under an old version become unreachable when the version
/// advances; they are never looked up again and never actively purged
/// (the key space is bounded by visible UI elements).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PermissionKey {
    resource: String,
    scopes: ScopeSet,
    version: SessionVersion,
}

/// One memoized authorization decision.
#[derive(Debug, Clone, Copy)]
pub struct PermissionDecision {
    pub authorized: bool,
    pub resolved_at: OffsetDateTime,
}

/// Answers "can the current principal perform these scopes on this
/// resource", caching decisions per session version and coalescing
/// concurrent identical queries into a single backend call.
///
/// Failures are delivered to every coalesced waiter uniformly and are
/// never cached: "couldn't determine" must not freeze into "denied".
pub struct PermissionResolver<R, B> {
    store: Arc<TokenStore<R>>,
    executor: AuthorizedRequestExecutor<R>,
    backend: Arc<B>,
    cache: Mutex<HashMap<PermissionKey, PermissionDecision>>,
    in_flight: Mutex<HashMap<PermissionKey, broadcast::Sender<Result<bool, AuthError>>>>,
}

enum Role {
    Leader(broadcast::Sender<Result<bool, AuthError>>),
    Waiter(broadcast::Receiver<Result<bool, AuthError>>),
}

impl<R: TokenRefresher, B: AuthorizationBackend> PermissionResolver<R, B> {
    #[must_use]
    pub fn new(store: Arc<TokenStore<R>>, backend: B) -> Self {
        Self {
            executor: AuthorizedRequestExecutor::new(store.clone()),
            store,
            backend: Arc::new(backend),
            cache: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a permission query, preferring the cache.
    ///
    /// Scopes are a set: order and duplicates do not affect the result or
    /// the cache key.
    ///
    /// # Errors
    ///
    /// Propagates the executor's error taxonomy; see
    /// [`AuthorizedRequestExecutor::execute`].
    pub async fn check(&self, resource: &str, scopes: &[&str]) -> Result<bool, AuthError> {
        self.resolve(resource, ScopeSet::new(scopes.iter().copied()), false)
            .await
    }

    /// Forced re-check: refresh the session first, then resolve against
    /// the new token generation, bypassing any cached answer.
    ///
    /// The previously cached entry is cleared up front, so even a failed
    /// refresh leaves no stale answer behind — an indeterminate state is
    /// safer than reusing a result from a now-suspect session.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::TokenRefreshFailed`] when the refresh is
    /// rejected, otherwise the executor's error taxonomy.
    pub async fn check_forced(&self, resource: &str, scopes: &[&str]) -> Result<bool, AuthError> {
        self.resolve(resource, ScopeSet::new(scopes.iter().copied()), true)
            .await
    }

    /// Peek at the cached decision for a query at the current session
    /// version, if any. Never issues a network call.
    #[must_use]
    pub fn cached(&self, resource: &str, scopes: &[&str]) -> Option<PermissionDecision> {
        let key = PermissionKey {
            resource: resource.to_string(),
            scopes: ScopeSet::new(scopes.iter().copied()),
            version: self.store.version(),
        };
        self.cache
            .lock()
            .expect("permission cache lock poisoned")
            .get(&key)
            .copied()
    }

    async fn resolve(
        &self,
        resource: &str,
        scopes: ScopeSet,
        force: bool,
    ) -> Result<bool, AuthError> {
        if force {
            let stale = PermissionKey {
                resource: resource.to_string(),
                scopes: scopes.clone(),
                version: self.store.version(),
            };
            self.cache
                .lock()
                .expect("permission cache lock poisoned")
                .remove(&stale);
            self.store.refresh().await?;
        }

        let key = PermissionKey {
            resource: resource.to_string(),
            scopes,
            version: self.store.version(),
        };

        if !force {
            let cached = self
                .cache
                .lock()
                .expect("permission cache lock poisoned")
                .get(&key)
                .copied();
            if let Some(decision) = cached {
                tracing::trace!(resource = %key.resource, version = %key.version, "permission cache hit");
                return Ok(decision.authorized);
            }
        }

        let role = {
            let mut in_flight = self
                .in_flight
                .lock()
                .expect("permission in-flight lock poisoned");
            match in_flight.get(&key) {
                Some(tx) => Role::Waiter(tx.subscribe()),
                None => {
                    let (tx, _) = broadcast::channel(1);
                    in_flight.insert(key.clone(), tx.clone());
                    Role::Leader(tx)
                }
            }
        };

        match role {
            Role::Waiter(mut rx) => {
                tracing::trace!(resource = %key.resource, "coalescing onto in-flight permission check");
                match rx.recv().await {
                    Ok(outcome) => outcome,
                    // Leader dropped without settling (e.g. panicked).
                    Err(_) => Err(AuthError::RequestFailed {
                        status: None,
                        message: "in-flight permission check was abandoned".into(),
                    }),
                }
            }
            Role::Leader(tx) => {
                let outcome = self.fetch(&key).await;

                // Settlement order matters: publish to the cache before
                // dropping the in-flight entry, so a caller arriving in
                // between finds the cached answer rather than re-fetching.
                if let Ok(authorized) = &outcome {
                    self.cache
                        .lock()
                        .expect("permission cache lock poisoned")
                        .insert(
                            key.clone(),
                            PermissionDecision {
                                authorized: *authorized,
                                resolved_at: OffsetDateTime::now_utc(),
                            },
                        );
                }
                self.in_flight
                    .lock()
                    .expect("permission in-flight lock poisoned")
                    .remove(&key);
                // No receivers is fine: nobody coalesced onto this call.
                let _ = tx.send(outcome.clone());
                outcome
            }
        }
    }

    /// One authorization round-trip through the executor.
    async fn fetch(&self, key: &PermissionKey) -> Result<bool, AuthError> {
        let backend = self.backend.clone();
        let resource = key.resource.clone();
        let scopes = key.scopes.clone();
        self.executor
            .execute(move |token| {
                let backend = backend.clone();
                let resource = resource.clone();
                let scopes = scopes.clone();
                async move { backend.check(&token, &resource, &scopes).await }
            })
            .await
    }
}
