use std::future::Future;

use serde::Deserialize;
use time::{Duration, OffsetDateTime};
use url::Url;

use crate::error::AuthError;
use crate::types::TokenGrant;

/// Default token lifetime assumed when the provider omits `expires_in`.
const DEFAULT_TOKEN_TTL_SECS: i64 = 300;

/// Consumer-provided refresh-token grant.
///
/// Implemented by whatever talks to the identity provider's token endpoint.
/// [`OAuthTokenRefresher`] is the stock HTTP implementation; tests supply
/// in-memory fakes.
pub trait TokenRefresher: Send + Sync + 'static {
    /// Exchange the stored refresh token for fresh token material.
    fn refresh(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<TokenGrant, AuthError>> + Send;
}

/// Consumer-provided interactive login/logout triggers.
///
/// The interactive flow itself (redirects, provider UI) is outside this
/// crate; implementations suspend until the provider hands control back.
/// Outcomes arrive separately as [`IdentityEvent`](crate::IdentityEvent)s
/// fed to [`TokenStore`](crate::TokenStore).
pub trait InteractiveAuth: Send + Sync + 'static {
    /// Kick off the provider's interactive login flow.
    fn begin_login(&self) -> impl Future<Output = Result<(), AuthError>> + Send;

    /// Kick off provider sign-out.
    fn begin_logout(&self) -> impl Future<Output = Result<(), AuthError>> + Send;
}

/// Token response from the provider's token endpoint.
#[derive(Debug, Clone, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[allow(dead_code)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// `grant_type=refresh_token` client against an `OAuth2` token endpoint.
pub struct OAuthTokenRefresher {
    token_url: Url,
    client_id: String,
    http: reqwest::Client,
}

impl OAuthTokenRefresher {
    /// Create a refresher against the given token endpoint.
    #[must_use]
    pub fn new(token_url: Url, client_id: impl Into<String>) -> Self {
        Self {
            token_url,
            client_id: client_id.into(),
            http: reqwest::Client::new(),
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }
}

impl TokenRefresher for OAuthTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AuthError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
        ];

        let response = self
            .http
            .post(self.token_url.clone())
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::TokenRefreshFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::TokenRefreshFailed(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let grant = response
            .json::<RefreshResponse>()
            .await
            .map_err(|e| AuthError::TokenRefreshFailed(e.to_string()))?;

        let ttl = grant
            .expires_in
            .map_or(DEFAULT_TOKEN_TTL_SECS, |secs| {
                i64::try_from(secs).unwrap_or(DEFAULT_TOKEN_TTL_SECS)
            });

        Ok(TokenGrant {
            access_token: grant.access_token,
            expires_at: OffsetDateTime::now_utc() + Duration::seconds(ttl),
            refresh_token: grant.refresh_token,
        })
    }
}
