/// Error taxonomy surfaced by the session core.
///
/// `Unauthenticated`, `TokenRefreshFailed` and `TokenExpired` all mean the
/// caller should drive the user back through an interactive login.
/// `RequestFailed` is not an auth concern and may be transient; surface it
/// as a retry-capable notification, never as a permission denial.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum AuthError {
    /// No valid session at all — the caller must trigger login.
    #[error("not authenticated")]
    Unauthenticated,

    /// The identity provider rejected a refresh attempt.
    #[error("token refresh failed: {0}")]
    TokenRefreshFailed(String),

    /// A request was rejected as unauthorized even after one refresh + retry.
    #[error("access token expired")]
    TokenExpired,

    /// Transport or server failure unrelated to authentication,
    /// surfaced verbatim with the underlying status and message.
    #[error("request failed (status {status:?}): {message}")]
    RequestFailed {
        status: Option<u16>,
        message: String,
    },

    /// Missing or invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Failure of one network round-trip, as reported by the transport closure
/// handed to [`AuthorizedRequestExecutor::execute`](crate::AuthorizedRequestExecutor::execute).
///
/// The executor only treats [`RequestFailure::TokenRejected`] specially
/// (one refresh + one retry); everything else passes through as
/// [`AuthError::RequestFailed`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestFailure {
    /// The server rejected the bearer token itself, as opposed to a
    /// business-logic rejection of the request.
    #[error("access token rejected by server")]
    TokenRejected,

    /// Any other transport or server failure.
    #[error("transport error (status {status:?}): {message}")]
    Transport {
        status: Option<u16>,
        message: String,
    },
}

impl From<reqwest::Error> for RequestFailure {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}

impl From<RequestFailure> for AuthError {
    fn from(e: RequestFailure) -> Self {
        match e {
            RequestFailure::TokenRejected => Self::TokenExpired,
            RequestFailure::Transport { status, message } => {
                Self::RequestFailed { status, message }
            }
        }
    }
}
