//! Authentication filter.
//!
//! # State Machine (per request)
//! ```text
//! START
//!   → resolve route ──── no match ──────────────→ REJECTED (RoutingNotFound, 404)
//!   → POLICY_RESOLVED
//!       public ──────────────────────────────────→ PASSED (request untouched)
//!       protected:
//!         no Authorization header ───────────────→ REJECTED (missing credential)
//!         not "Bearer " prefixed ────────────────→ REJECTED (malformed scheme)
//!         empty token ───────────────────────────→ REJECTED (empty token)
//!         validator refuses ─────────────────────→ REJECTED (invalid or expired token)
//!         otherwise ─────────────────────────────→ PASSED (+ identity header)
//! ```
//!
//! # Design Decisions
//! - Public endpoints are route data, not string checks in this module
//! - The filter consumes the inbound request and yields a new one; nothing else holds it
//! - Routes are read from an atomically swappable snapshot; a request sees one table throughout

use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request};

use crate::auth::credential::Credential;
use crate::auth::validator::TokenValidator;
use crate::error::GatewayError;
use crate::routing::{AuthPolicy, RouteTable};

/// Result of evaluating a route policy against request headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationOutcome {
    /// Pass. `subject` is `None` on public routes.
    Allowed { subject: Option<String> },
    Rejected(GatewayError),
}

/// A request cleared for dispatch.
#[derive(Debug)]
pub struct Admission<B> {
    pub backend: String,
    pub policy: AuthPolicy,
    pub subject: Option<String>,
    pub request: Request<B>,
}

/// Route-aware bearer authentication.
#[derive(Debug)]
pub struct AuthenticationFilter {
    routes: ArcSwap<RouteTable>,
    validator: Arc<TokenValidator>,
    identity_header: HeaderName,
}

impl AuthenticationFilter {
    pub fn new(routes: RouteTable, validator: Arc<TokenValidator>, identity_header: HeaderName) -> Self {
        Self {
            routes: ArcSwap::from_pointee(routes),
            validator,
            identity_header,
        }
    }

    /// Current route table snapshot.
    pub fn routes(&self) -> Arc<RouteTable> {
        self.routes.load_full()
    }

    /// Publish a new route table. In-flight requests keep the snapshot they loaded.
    pub fn replace_routes(&self, routes: RouteTable) {
        self.routes.store(Arc::new(routes));
    }

    pub fn identity_header(&self) -> &HeaderName {
        &self.identity_header
    }

    /// Apply `policy` to the request headers.
    pub fn authenticate(&self, policy: AuthPolicy, headers: &HeaderMap) -> AuthenticationOutcome {
        if policy == AuthPolicy::Public {
            return AuthenticationOutcome::Allowed { subject: None };
        }

        let credential = match Credential::from_headers(headers) {
            Ok(c) => c,
            Err(e) => return AuthenticationOutcome::Rejected(e),
        };

        match self.validator.verify(credential.token()) {
            Ok(claims) => AuthenticationOutcome::Allowed {
                subject: Some(claims.sub),
            },
            Err(e) => {
                tracing::debug!(reason = e.label(), "Token refused");
                AuthenticationOutcome::Rejected(GatewayError::InvalidOrExpiredToken)
            }
        }
    }

    /// Resolve the route and authenticate, producing the request to forward.
    pub fn apply<B>(&self, request: Request<B>) -> Result<Admission<B>, GatewayError> {
        let routes = self.routes.load();
        let rule = routes
            .resolve(request.uri().path())
            .ok_or(GatewayError::RoutingNotFound)?;
        let backend = rule.backend.clone();
        let policy = rule.policy;

        let subject = match self.authenticate(policy, request.headers()) {
            AuthenticationOutcome::Allowed { subject } => subject,
            AuthenticationOutcome::Rejected(e) => return Err(e),
        };

        let request = match &subject {
            Some(subject) => {
                // A subject that cannot travel as a header is not a usable identity.
                let value =
                    HeaderValue::from_str(subject).map_err(|_| GatewayError::InvalidOrExpiredToken)?;
                let (mut parts, body) = request.into_parts();
                parts.headers.insert(self.identity_header.clone(), value);
                Request::from_parts(parts, body)
            }
            None => request,
        };

        Ok(Admission {
            backend,
            policy,
            subject,
            request,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::keys::KeyMaterial;
    use crate::auth::validator::ValidatorOptions;
    use crate::routing::RoutingRule;
    use axum::http::header::AUTHORIZATION;
    use jsonwebtoken::{Algorithm, EncodingKey, Header};
    use serde_json::json;

    const SECRET: &[u8] = b"filter-test-secret";

    fn filter() -> AuthenticationFilter {
        let routes = RouteTable::new(vec![
            RoutingRule::new("/api/v1/auth/**", "auth-service", AuthPolicy::Public).unwrap(),
            RoutingRule::new("/api/v1/users/**", "user-service", AuthPolicy::Protected).unwrap(),
        ]);
        let validator = TokenValidator::new(
            Algorithm::HS256,
            &KeyMaterial::from_secret(SECRET),
            ValidatorOptions {
                require_expiry: true,
                ..Default::default()
            },
        )
        .unwrap();
        AuthenticationFilter::new(routes, Arc::new(validator), HeaderName::from_static("x-user-id"))
    }

    fn token_for(sub: &str) -> String {
        let claims = json!({ "sub": sub, "exp": jsonwebtoken::get_current_timestamp() + 600 });
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(SECRET))
            .unwrap()
    }

    fn request(path: &str, authorization: Option<&str>) -> Request<()> {
        let mut builder = Request::builder().uri(path);
        if let Some(value) = authorization {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn test_public_route_passes_without_header() {
        let admission = filter().apply(request("/api/v1/auth/login", None)).unwrap();
        assert_eq!(admission.backend, "auth-service");
        assert_eq!(admission.policy, AuthPolicy::Public);
        assert_eq!(admission.subject, None);
        assert!(admission.request.headers().get("x-user-id").is_none());
    }

    #[test]
    fn test_public_route_ignores_garbage_credential() {
        let admission = filter()
            .apply(request("/api/v1/auth/login", Some("Token nonsense")))
            .unwrap();
        assert_eq!(
            admission.request.headers().get(AUTHORIZATION).unwrap(),
            "Token nonsense"
        );
    }

    #[test]
    fn test_protected_route_injects_identity() {
        let token = token_for("alice");
        let admission = filter()
            .apply(request("/api/v1/users/42", Some(&format!("Bearer {token}"))))
            .unwrap();
        assert_eq!(admission.backend, "user-service");
        assert_eq!(admission.subject.as_deref(), Some("alice"));
        assert_eq!(admission.request.headers().get("x-user-id").unwrap(), "alice");
    }

    #[test]
    fn test_client_supplied_identity_is_overwritten() {
        let token = token_for("alice");
        let mut req = request("/api/v1/users/42", Some(&format!("Bearer {token}")));
        req.headers_mut()
            .insert("x-user-id", HeaderValue::from_static("admin"));
        let admission = filter().apply(req).unwrap();
        let values: Vec<_> = admission.request.headers().get_all("x-user-id").iter().collect();
        assert_eq!(values, vec!["alice"]);
    }

    #[test]
    fn test_missing_credential() {
        let err = filter().apply(request("/api/v1/users/42", None)).unwrap_err();
        assert_eq!(err, GatewayError::MissingCredential);
    }

    #[test]
    fn test_malformed_scheme() {
        let err = filter()
            .apply(request("/api/v1/users/42", Some("Token xyz")))
            .unwrap_err();
        assert_eq!(err, GatewayError::MalformedScheme);
        assert_eq!(err.to_string(), "malformed scheme");
    }

    #[test]
    fn test_empty_token() {
        let err = filter()
            .apply(request("/api/v1/users/42", Some("Bearer ")))
            .unwrap_err();
        assert_eq!(err, GatewayError::EmptyToken);
    }

    #[test]
    fn test_invalid_token() {
        let err = filter()
            .apply(request("/api/v1/users/42", Some("Bearer not.a.jwt")))
            .unwrap_err();
        assert_eq!(err, GatewayError::InvalidOrExpiredToken);
    }

    #[test]
    fn test_unknown_route() {
        let err = filter().apply(request("/unknown/path", None)).unwrap_err();
        assert_eq!(err, GatewayError::RoutingNotFound);
    }

    #[test]
    fn test_authenticate_outcomes() {
        let f = filter();
        assert_eq!(
            f.authenticate(AuthPolicy::Public, &HeaderMap::new()),
            AuthenticationOutcome::Allowed { subject: None }
        );
        assert_eq!(
            f.authenticate(AuthPolicy::Protected, &HeaderMap::new()),
            AuthenticationOutcome::Rejected(GatewayError::MissingCredential)
        );
    }

    #[test]
    fn test_replace_routes() {
        let f = filter();
        f.replace_routes(RouteTable::new(vec![RoutingRule::new(
            "/unknown/**",
            "fallback",
            AuthPolicy::Public,
        )
        .unwrap()]));
        assert_eq!(f.apply(request("/unknown/path", None)).unwrap().backend, "fallback");
        assert_eq!(
            f.apply(request("/api/v1/auth/login", None)).unwrap_err(),
            GatewayError::RoutingNotFound
        );
        assert_eq!(f.routes().len(), 1);
    }
}
