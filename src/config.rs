use serde::Serialize;
use url::Url;

use crate::authz::HttpAuthorizationBackend;
use crate::error::AuthError;
use crate::provider::OAuthTokenRefresher;
use crate::route_guard::RouteGuard;

/// Core configuration: where the identity provider and the authorization
/// backend live, and how the route guard treats paths.
///
/// Required fields are constructor parameters; endpoint URLs default to
/// conventional paths under the API base. Override with `with_*` methods,
/// or use [`from_env()`](CoreConfig::from_env) for convention-based setup.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    client_id: String,
    api_base_url: Url,
    token_url: Url,
    authz_check_url: Url,
    admin_console_url: Option<Url>,
    login_path: String,
    public_paths: Vec<String>,
}

impl CoreConfig {
    /// Create a configuration with the required client ID and API base.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if default endpoint URLs cannot be
    /// derived from the base (e.g. a cannot-be-a-base URL).
    pub fn new(client_id: impl Into<String>, api_base_url: Url) -> Result<Self, AuthError> {
        let token_url = api_base_url
            .join("oauth/token")
            .map_err(|e| AuthError::Config(format!("api base url: {e}")))?;
        let authz_check_url = api_base_url
            .join("authz/check")
            .map_err(|e| AuthError::Config(format!("api base url: {e}")))?;
        Ok(Self {
            client_id: client_id.into(),
            api_base_url,
            token_url,
            authz_check_url,
            admin_console_url: None,
            login_path: "/login".into(),
            public_paths: Vec::new(),
        })
    }

    /// Create a configuration from environment variables.
    ///
    /// # Required env vars
    /// - `CONSOLE_CLIENT_ID`: OAuth2 client ID
    /// - `CONSOLE_API_BASE_URL`: API base address (must be a valid URL)
    ///
    /// # Optional env vars
    /// - `CONSOLE_TOKEN_URL`: Override the token endpoint
    /// - `CONSOLE_AUTHZ_URL`: Override the authorization check endpoint
    /// - `CONSOLE_ADMIN_URL`: External admin console address
    /// - `CONSOLE_LOGIN_PATH`: Route guard login path
    /// - `CONSOLE_PUBLIC_PATHS`: Comma-separated public path prefixes
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if required env vars are missing or
    /// URLs are invalid.
    pub fn from_env() -> Result<Self, AuthError> {
        let client_id = std::env::var("CONSOLE_CLIENT_ID")
            .map_err(|_| AuthError::Config("CONSOLE_CLIENT_ID is required".into()))?;
        let api_base_url: Url = std::env::var("CONSOLE_API_BASE_URL")
            .map_err(|_| AuthError::Config("CONSOLE_API_BASE_URL is required".into()))?
            .parse()
            .map_err(|e| AuthError::Config(format!("CONSOLE_API_BASE_URL: {e}")))?;

        let mut config = Self::new(client_id, api_base_url)?;

        if let Ok(url_str) = std::env::var("CONSOLE_TOKEN_URL") {
            let url: Url = url_str
                .parse()
                .map_err(|e| AuthError::Config(format!("CONSOLE_TOKEN_URL: {e}")))?;
            config = config.with_token_url(url);
        }
        if let Ok(url_str) = std::env::var("CONSOLE_AUTHZ_URL") {
            let url: Url = url_str
                .parse()
                .map_err(|e| AuthError::Config(format!("CONSOLE_AUTHZ_URL: {e}")))?;
            config = config.with_authz_check_url(url);
        }
        if let Ok(url_str) = std::env::var("CONSOLE_ADMIN_URL") {
            let url: Url = url_str
                .parse()
                .map_err(|e| AuthError::Config(format!("CONSOLE_ADMIN_URL: {e}")))?;
            config = config.with_admin_console_url(url);
        }
        if let Ok(path) = std::env::var("CONSOLE_LOGIN_PATH") {
            config = config.with_login_path(path);
        }
        if let Ok(paths) = std::env::var("CONSOLE_PUBLIC_PATHS") {
            for path in paths.split(',') {
                config = config.with_public_path(path.trim());
            }
        }

        Ok(config)
    }

    #[must_use]
    pub fn with_token_url(mut self, url: Url) -> Self {
        self.token_url = url;
        self
    }

    #[must_use]
    pub fn with_authz_check_url(mut self, url: Url) -> Self {
        self.authz_check_url = url;
        self
    }

    #[must_use]
    pub fn with_admin_console_url(mut self, url: Url) -> Self {
        self.admin_console_url = Some(url);
        self
    }

    #[must_use]
    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    #[must_use]
    pub fn with_public_path(mut self, path: impl Into<String>) -> Self {
        self.public_paths.push(path.into());
        self
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn api_base_url(&self) -> &Url {
        &self.api_base_url
    }

    #[must_use]
    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    #[must_use]
    pub fn authz_check_url(&self) -> &Url {
        &self.authz_check_url
    }

    /// Token refresher against the configured token endpoint.
    #[must_use]
    pub fn token_refresher(&self) -> OAuthTokenRefresher {
        OAuthTokenRefresher::new(self.token_url.clone(), self.client_id.clone())
    }

    /// Authorization backend against the configured check endpoint.
    #[must_use]
    pub fn authorization_backend(&self) -> HttpAuthorizationBackend {
        HttpAuthorizationBackend::new(self.authz_check_url.clone())
    }

    /// Route guard configured with this config's login and public paths.
    #[must_use]
    pub fn route_guard(&self) -> RouteGuard {
        let mut guard = RouteGuard::new().with_login_path(self.login_path.clone());
        for path in &self.public_paths {
            guard = guard.with_public_path(path.clone());
        }
        guard
    }

    /// The non-sensitive configuration document consumers may expose
    /// read-only (no authentication logic lives behind it).
    #[must_use]
    pub fn public(&self) -> PublicRuntimeConfig {
        PublicRuntimeConfig {
            api_base_url: self.api_base_url.to_string(),
            admin_console_url: self.admin_console_url.as_ref().map(Url::to_string),
        }
    }
}

/// Read-only, non-sensitive runtime configuration.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct PublicRuntimeConfig {
    pub api_base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_console_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> CoreConfig {
        CoreConfig::new("console-web", "https://api.example.com/".parse().unwrap()).unwrap()
    }

    #[test]
    fn default_endpoints_derive_from_the_base() {
        let config = test_config();
        assert_eq!(
            config.token_url().as_str(),
            "https://api.example.com/oauth/token"
        );
        assert_eq!(
            config.authz_check_url().as_str(),
            "https://api.example.com/authz/check"
        );
    }

    #[test]
    fn overrides_replace_derived_endpoints() {
        let config = test_config()
            .with_token_url("https://id.example.com/token".parse().unwrap())
            .with_authz_check_url("https://authz.example.com/check".parse().unwrap());
        assert_eq!(config.token_url().as_str(), "https://id.example.com/token");
        assert_eq!(
            config.authz_check_url().as_str(),
            "https://authz.example.com/check"
        );
    }

    #[test]
    fn public_document_omits_missing_admin_console() {
        let json = serde_json::to_value(test_config().public()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "apiBaseUrl": "https://api.example.com/" })
        );
    }

    #[test]
    fn public_document_includes_admin_console_when_set() {
        let config =
            test_config().with_admin_console_url("https://admin.example.com/".parse().unwrap());
        let json = serde_json::to_value(config.public()).unwrap();
        assert_eq!(
            json["adminConsoleUrl"],
            serde_json::json!("https://admin.example.com/")
        );
    }

    #[test]
    fn route_guard_carries_configured_paths() {
        let guard = test_config()
            .with_login_path("/signin")
            .with_public_path("/health")
            .route_guard();
        assert_eq!(guard.decide("/health", false), crate::RouteDecision::Allow);
        assert_eq!(guard.decide("/signin", false), crate::RouteDecision::Allow);
    }
}
