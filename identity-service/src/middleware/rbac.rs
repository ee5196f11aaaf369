//! Per-route permission check.
//!
//! Must be installed with `route_layer` so the router has already resolved
//! the [`MatchedPath`]: the resolver is given the route template
//! (`/roles/:id`), never the literal request URI.

use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use service_core::{error::AppError, middleware::session::AuthIdentity};

use crate::services::PermissionResolver;

pub async fn rbac_middleware(
    State(resolver): State<PermissionResolver>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let identity = req
        .extensions()
        .get::<AuthIdentity>()
        .cloned()
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Authentication required")))?;

    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "Permission check installed outside of a matched route"
            ))
        })?;

    resolver
        .authorize(&identity.identity_id, &route, req.method().as_str())
        .await?;

    Ok(next.run(req).await)
}
