//! Role-based permission resolver.
//!
//! Roles and permissions are never cached or carried in tokens: every
//! decision re-reads the identity, its role and the role's permissions so
//! that edits take effect on the next request.
//!
//! Callers must pass the route *template* the router matched (`/roles/:id`),
//! never the literal request path. Permissions are compared as exact strings.

use std::sync::Arc;

use crate::db::CredentialStore;
use crate::models::{Identity, Permission, Role};
use crate::services::ServiceError;

#[derive(Clone)]
pub struct PermissionResolver {
    store: Arc<dyn CredentialStore>,
}

impl PermissionResolver {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Allow iff the identity is active and its role grants exactly
    /// (`route_template`, `method`).
    pub async fn authorize(
        &self,
        identity_id: &str,
        route_template: &str,
        method: &str,
    ) -> Result<(), ServiceError> {
        let result = self.decide(identity_id, route_template, method).await;

        let decision = match &result {
            Ok(()) => "allow",
            Err(ServiceError::Forbidden) => "deny",
            Err(ServiceError::Unauthorized) => "unauthenticated",
            Err(_) => "error",
        };
        metrics::counter!("identity_authz_decisions_total", "decision" => decision).increment(1);

        if let Err(e) = &result {
            tracing::debug!(
                identity_id,
                route = route_template,
                method,
                error = %e,
                "Authorization refused"
            );
        }

        result
    }

    async fn decide(
        &self,
        identity_id: &str,
        route_template: &str,
        method: &str,
    ) -> Result<(), ServiceError> {
        let identity = self
            .store
            .find_identity_by_id(identity_id)
            .await?
            .filter(Identity::is_active)
            .ok_or(ServiceError::Unauthorized)?;

        let (_, permissions) = self.resolve_role(&identity).await?;

        if permissions
            .iter()
            .any(|permission| permission.matches(route_template, method))
        {
            Ok(())
        } else {
            Err(ServiceError::Forbidden)
        }
    }

    /// The identity's role and the permissions it grants. Dangling
    /// permission ids are skipped.
    pub async fn resolve_role(
        &self,
        identity: &Identity,
    ) -> Result<(Role, Vec<Permission>), ServiceError> {
        let role = self
            .store
            .find_role_by_id(&identity.role_id)
            .await?
            .ok_or(ServiceError::RoleNotFound)?;

        let permissions = self
            .store
            .find_permissions_by_ids(&role.permission_ids)
            .await?;

        Ok((role, permissions))
    }
}
