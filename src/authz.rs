use std::future::Future;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::RequestFailure;
use crate::types::ScopeSet;

/// Black-box authorization decision: `(token, resource, scopes) -> bool`.
///
/// The policy evaluation itself lives in the authorization service;
/// this crate only transports the question and caches the answer.
pub trait AuthorizationBackend: Send + Sync + 'static {
    fn check(
        &self,
        access_token: &str,
        resource: &str,
        scopes: &ScopeSet,
    ) -> impl Future<Output = Result<bool, RequestFailure>> + Send;
}

/// Request shape sent to the authorization endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckRequest<'a> {
    resource_name: &'a str,
    scopes: &'a [String],
}

/// Decision returned by the authorization endpoint.
#[derive(Debug, Deserialize)]
struct CheckResponse {
    authorized: bool,
}

/// Authorization backend over HTTP, posting the query with the bearer token.
///
/// A `401` is reported as [`RequestFailure::TokenRejected`] so the executor
/// can refresh and retry; any other non-2xx is a transport failure with the
/// body preserved as the message.
pub struct HttpAuthorizationBackend {
    check_url: Url,
    http: reqwest::Client,
}

impl HttpAuthorizationBackend {
    #[must_use]
    pub fn new(check_url: Url) -> Self {
        Self {
            check_url,
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

impl AuthorizationBackend for HttpAuthorizationBackend {
    async fn check(
        &self,
        access_token: &str,
        resource: &str,
        scopes: &ScopeSet,
    ) -> Result<bool, RequestFailure> {
        let response = self
            .http
            .post(self.check_url.clone())
            .bearer_auth(access_token)
            .json(&CheckRequest {
                resource_name: resource,
                scopes: scopes.as_slice(),
            })
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(RequestFailure::TokenRejected);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RequestFailure::Transport {
                status: Some(status.as_u16()),
                message: body,
            });
        }

        let decision = response.json::<CheckResponse>().await?;
        Ok(decision.authorized)
    }
}
