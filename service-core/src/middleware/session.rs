//! Gateway-side session check.
//!
//! Every request to a protected prefix must carry `Authorization: Bearer
//! <session token>`. The middleware only verifies the token; what the identity
//! may do is decided later, per route, by the permission resolver of the
//! service that owns the route.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderValue, header, request::Parts},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::{error::AppError, token::TokenService};

/// Header carrying the verified identity id to downstream handlers.
pub const IDENTITY_HEADER: &str = "x-identity-id";

#[derive(Clone)]
pub struct SessionGuard {
    tokens: TokenService,
    public_prefixes: Arc<Vec<String>>,
}

impl SessionGuard {
    pub fn new(tokens: TokenService, public_prefixes: Vec<String>) -> Self {
        Self {
            tokens,
            public_prefixes: Arc::new(public_prefixes),
        }
    }

    /// Whether `path` is reachable without a session.
    pub fn is_public(&self, path: &str) -> bool {
        self.public_prefixes.iter().any(|prefix| {
            let prefix = prefix.trim_end_matches('/');
            path == prefix
                || path
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }
}

/// Identity proven by a valid session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthIdentity {
    pub identity_id: String,
}

pub fn bearer_token(headers: &axum::http::HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

pub async fn session_auth_middleware(
    State(guard): State<SessionGuard>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    // Never trust an identity header coming from the client.
    req.headers_mut().remove(IDENTITY_HEADER);

    if guard.is_public(req.uri().path()) {
        return Ok(next.run(req).await);
    }

    let token = bearer_token(req.headers()).ok_or_else(|| {
        AppError::Unauthorized(anyhow::anyhow!("Missing or invalid Authorization header"))
    })?;

    let identity_id = guard.tokens.verify_session(token).map_err(|e| {
        tracing::debug!(error = %e, path = %req.uri().path(), "Rejected session token");
        AppError::from(e)
    })?;

    let value = HeaderValue::from_str(&identity_id).map_err(|_| {
        AppError::Unauthorized(anyhow::anyhow!("Invalid or expired token"))
    })?;
    req.headers_mut().insert(IDENTITY_HEADER, value);
    req.extensions_mut().insert(AuthIdentity { identity_id });

    Ok(next.run(req).await)
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthIdentity>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Authentication required")))
    }
}
