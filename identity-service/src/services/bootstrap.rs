//! Startup seeding of permissions and roles.
//!
//! Idempotent: rerunning against a seeded store creates nothing new.

use std::sync::Arc;

use crate::{
    config::RoleConfig,
    db::CredentialStore,
    models::{Permission, Role},
    services::{RoutePermissionTable, ServiceError},
    utils::normalize_email,
};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BootstrapReport {
    pub permissions_created: usize,
    pub admin_role_id: String,
    pub default_role_id: String,
    pub admin_promoted: bool,
}

/// Ensure every route in `table` has a permission, the admin role grants all
/// of them, and the default sign-up role exists. Optionally promotes an
/// existing identity to the admin role.
pub async fn bootstrap(
    store: &Arc<dyn CredentialStore>,
    table: &RoutePermissionTable,
    roles: &RoleConfig,
) -> Result<BootstrapReport, ServiceError> {
    let mut report = BootstrapReport::default();
    let mut permission_ids = Vec::with_capacity(table.routes.len());

    for route in &table.routes {
        let existing = store
            .find_permission(&route.name, &route.path, route.method)
            .await?;

        let id = match existing {
            Some(permission) => permission.id,
            None => {
                let permission = Permission::new(
                    route.name.clone(),
                    route.category.clone(),
                    route.method,
                    route.path.clone(),
                    route.description.clone(),
                );
                store.insert_permission(&permission).await?;
                report.permissions_created += 1;
                permission.id
            }
        };
        permission_ids.push(id);
    }

    let admin = match store.find_role_by_name(&roles.admin_role).await? {
        Some(mut role) => {
            let missing: Vec<String> = permission_ids
                .iter()
                .filter(|id| !role.grants(id))
                .cloned()
                .collect();
            if !missing.is_empty() {
                role.permission_ids.extend(missing);
                store.update_role(&role).await?;
            }
            role
        }
        None => {
            let role = Role::new(
                roles.admin_role.clone(),
                "Full administrative access".to_string(),
                permission_ids,
            );
            store.insert_role(&role).await?;
            role
        }
    };
    report.admin_role_id = admin.id.clone();

    let default = match store.find_role_by_name(&roles.default_role).await? {
        Some(role) => role,
        None => {
            let role = Role::new(
                roles.default_role.clone(),
                "Role given to new accounts".to_string(),
                Vec::new(),
            );
            store.insert_role(&role).await?;
            role
        }
    };
    report.default_role_id = default.id;

    if let Some(raw) = &roles.bootstrap_admin_email {
        match normalize_email(raw) {
            Some(email) => match store.find_identity_by_email(&email).await? {
                Some(identity) if identity.role_id != admin.id => {
                    store.set_identity_role(&identity.id, &admin.id).await?;
                    report.admin_promoted = true;
                    tracing::info!(identity_id = %identity.id, "Promoted bootstrap admin");
                }
                Some(_) => {}
                None => tracing::warn!(email = %email, "Bootstrap admin account not found"),
            },
            None => tracing::warn!("BOOTSTRAP_ADMIN_EMAIL is not a valid email"),
        }
    }

    tracing::info!(
        permissions_created = report.permissions_created,
        admin_role = %roles.admin_role,
        default_role = %roles.default_role,
        "Bootstrap complete"
    );
    Ok(report)
}
