#![doc = include_str!("../README.md")]

pub mod authz;
pub mod config;
pub mod error;
pub mod executor;
pub mod permissions;
pub mod provider;
pub mod route_guard;
pub mod session;
pub mod token_store;
pub mod types;

// Re-exports for convenient access
pub use authz::{AuthorizationBackend, HttpAuthorizationBackend};
pub use config::{CoreConfig, PublicRuntimeConfig};
pub use error::{AuthError, RequestFailure};
pub use executor::AuthorizedRequestExecutor;
pub use permissions::{PermissionDecision, PermissionResolver};
pub use provider::{InteractiveAuth, OAuthTokenRefresher, TokenRefresher};
pub use route_guard::{RouteDecision, RouteGuard};
pub use session::SessionStateMachine;
pub use token_store::TokenStore;
pub use types::{
    IdentityEvent, Principal, ScopeSet, SessionSnapshot, SessionStatus, SessionVersion, TokenGrant,
};
