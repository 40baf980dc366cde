/// Outcome of a route boundary check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    Allow,
    RedirectTo {
        path: String,
        query: Vec<(String, String)>,
    },
}

impl RouteDecision {
    /// Render the redirect target as a location string, query values
    /// percent-encoded. `None` for [`RouteDecision::Allow`].
    #[must_use]
    pub fn location(&self) -> Option<String> {
        match self {
            Self::Allow => None,
            Self::RedirectTo { path, query } => {
                if query.is_empty() {
                    return Some(path.clone());
                }
                let query = query
                    .iter()
                    .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
                    .collect::<Vec<_>>()
                    .join("&");
                Some(format!("{path}?{query}"))
            }
        }
    }
}

/// Stateless allow/redirect decision at the navigation boundary.
///
/// Deliberately shallow: it sees only the *presence* of session evidence
/// (e.g. a cookie exists), never token contents, so it can run in a
/// restricted execution environment without secret material. Validity and
/// fine-grained permissions are checked later by
/// [`PermissionResolver`](crate::PermissionResolver).
#[derive(Debug, Clone)]
pub struct RouteGuard {
    login_path: String,
    home_path: String,
    public_paths: Vec<String>,
}

impl Default for RouteGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteGuard {
    #[must_use]
    pub fn new() -> Self {
        Self {
            login_path: "/login".into(),
            home_path: "/".into(),
            public_paths: vec!["/login".into()],
        }
    }

    /// Override the login path (kept in the public set).
    #[must_use]
    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.public_paths.retain(|p| *p != self.login_path);
        self.public_paths.push(path.clone());
        self.login_path = path;
        self
    }

    /// Override the post-login landing path.
    #[must_use]
    pub fn with_home_path(mut self, path: impl Into<String>) -> Self {
        self.home_path = path.into();
        self
    }

    /// Add a path prefix that never requires session evidence.
    #[must_use]
    pub fn with_public_path(mut self, path: impl Into<String>) -> Self {
        self.public_paths.push(path.into());
        self
    }

    /// Decide one navigation. Never fails; two outcomes only.
    #[must_use]
    pub fn decide(&self, path: &str, has_session_evidence: bool) -> RouteDecision {
        // A signed-in visitor has no business on the login page.
        if has_session_evidence && path == self.login_path {
            return RouteDecision::RedirectTo {
                path: self.home_path.clone(),
                query: Vec::new(),
            };
        }
        if self.is_public(path) {
            return RouteDecision::Allow;
        }
        if !has_session_evidence {
            return RouteDecision::RedirectTo {
                path: self.login_path.clone(),
                query: vec![("callbackUrl".to_string(), path.to_string())],
            };
        }
        RouteDecision::Allow
    }

    fn is_public(&self, path: &str) -> bool {
        self.public_paths
            .iter()
            .any(|p| path == p || path.starts_with(&format!("{p}/")))
    }
}
