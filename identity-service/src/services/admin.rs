//! Administration of roles, permissions and identities.

use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;

use crate::{
    db::CredentialStore,
    dtos::admin::{
        CreatePermissionRequest, CreateRoleRequest, UpdatePermissionRequest, UpdateRoleRequest,
    },
    models::{HttpMethod, Identity, IdentityStatus, Permission, Role},
    services::ServiceError,
};

#[derive(Clone)]
pub struct AdminService {
    store: Arc<dyn CredentialStore>,
}

impl AdminService {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    // Roles

    pub async fn list_roles(&self) -> Result<Vec<Role>, ServiceError> {
        Ok(self.store.list_roles().await?)
    }

    pub async fn get_role(&self, id: &str) -> Result<Role, ServiceError> {
        self.store
            .find_role_by_id(id)
            .await?
            .ok_or(ServiceError::NotFound("Role"))
    }

    pub async fn create_role(&self, req: CreateRoleRequest) -> Result<Role, ServiceError> {
        let name = role_name(&req.name)?;
        let permission_ids = self.existing_permission_ids(req.permission_ids).await?;

        let role = Role::new(name, req.description.trim().to_string(), permission_ids);
        self.store.insert_role(&role).await?;

        tracing::info!(role_id = %role.id, name = %role.name, "Role created");
        Ok(role)
    }

    pub async fn update_role(&self, id: &str, req: UpdateRoleRequest) -> Result<Role, ServiceError> {
        let mut role = self.get_role(id).await?;

        if let Some(name) = req.name {
            role.name = role_name(&name)?;
        }
        if let Some(description) = req.description {
            role.description = description.trim().to_string();
        }
        if let Some(ids) = req.permission_ids {
            role.permission_ids = self.existing_permission_ids(ids).await?;
        }
        role.updated_utc = Utc::now();

        if !self.store.update_role(&role).await? {
            return Err(ServiceError::NotFound("Role"));
        }

        tracing::info!(role_id = %role.id, "Role updated");
        Ok(role)
    }

    /// Refused while any identity still holds the role.
    pub async fn delete_role(&self, id: &str) -> Result<(), ServiceError> {
        let role = self.get_role(id).await?;

        let holders = self.store.count_identities_with_role(&role.id).await?;
        if holders > 0 {
            return Err(ServiceError::Conflict(format!(
                "The role {} is assigned to {} user(s), reassign them first",
                role.name, holders
            )));
        }

        self.store.delete_role(&role.id).await?;
        tracing::info!(role_id = %role.id, "Role deleted");
        Ok(())
    }

    /// Deduplicated, and every id must name a stored permission.
    async fn existing_permission_ids(&self, ids: Vec<String>) -> Result<Vec<String>, ServiceError> {
        let mut seen = HashSet::new();
        let ids: Vec<String> = ids
            .into_iter()
            .map(|id| id.trim().to_string())
            .filter(|id| seen.insert(id.clone()))
            .collect();

        let found = self.store.find_permissions_by_ids(&ids).await?;
        if found.len() != ids.len() {
            return Err(ServiceError::NotFound("Permission"));
        }
        Ok(ids)
    }

    // Permissions

    pub async fn list_permissions(&self) -> Result<Vec<Permission>, ServiceError> {
        Ok(self.store.list_permissions().await?)
    }

    pub async fn get_permission(&self, id: &str) -> Result<Permission, ServiceError> {
        self.store
            .find_permission_by_id(id)
            .await?
            .ok_or(ServiceError::NotFound("Permission"))
    }

    pub async fn create_permission(
        &self,
        req: CreatePermissionRequest,
    ) -> Result<Permission, ServiceError> {
        let method = parse_method(&req.method)?;
        let path = route_path(&req.path)?;

        let permission = Permission::new(
            req.name.trim().to_string(),
            req.category.trim().to_string(),
            method,
            path,
            req.description.trim().to_string(),
        );
        self.store.insert_permission(&permission).await?;

        tracing::info!(
            permission_id = %permission.id,
            method = %permission.method,
            path = %permission.path,
            "Permission created"
        );
        Ok(permission)
    }

    pub async fn update_permission(
        &self,
        id: &str,
        req: UpdatePermissionRequest,
    ) -> Result<Permission, ServiceError> {
        let mut permission = self.get_permission(id).await?;

        if let Some(name) = req.name {
            permission.name = name.trim().to_string();
        }
        if let Some(category) = req.category {
            permission.category = category.trim().to_string();
        }
        if let Some(method) = req.method {
            permission.method = parse_method(&method)?;
        }
        if let Some(path) = req.path {
            permission.path = route_path(&path)?;
        }
        if let Some(description) = req.description {
            permission.description = description.trim().to_string();
        }

        if !self.store.update_permission(&permission).await? {
            return Err(ServiceError::NotFound("Permission"));
        }
        Ok(permission)
    }

    /// Also removes the permission from every role granting it.
    pub async fn delete_permission(&self, id: &str) -> Result<(), ServiceError> {
        if !self.store.delete_permission(id).await? {
            return Err(ServiceError::NotFound("Permission"));
        }
        tracing::info!(permission_id = %id, "Permission deleted");
        Ok(())
    }

    // Identities

    pub async fn list_identities(&self) -> Result<Vec<Identity>, ServiceError> {
        Ok(self.store.list_identities().await?)
    }

    pub async fn get_identity(&self, id: &str) -> Result<Identity, ServiceError> {
        self.store
            .find_identity_by_id(id)
            .await?
            .ok_or(ServiceError::NotFound("User"))
    }

    pub async fn delete_identity(&self, id: &str) -> Result<(), ServiceError> {
        if !self.store.delete_identity(id).await? {
            return Err(ServiceError::NotFound("User"));
        }
        tracing::info!(identity_id = %id, "Identity deleted");
        Ok(())
    }

    pub async fn assign_role(&self, id: &str, role_id: &str) -> Result<Identity, ServiceError> {
        let role = self.get_role(role_id.trim()).await?;
        if !self.store.set_identity_role(id, &role.id).await? {
            return Err(ServiceError::NotFound("User"));
        }
        tracing::info!(identity_id = %id, role = %role.name, "Role assigned");
        self.get_identity(id).await
    }

    pub async fn set_status(
        &self,
        id: &str,
        status: IdentityStatus,
    ) -> Result<Identity, ServiceError> {
        if !self.store.set_identity_status(id, status).await? {
            return Err(ServiceError::NotFound("User"));
        }
        tracing::info!(identity_id = %id, status = %status, "Identity status changed");
        self.get_identity(id).await
    }
}

fn role_name(raw: &str) -> Result<String, ServiceError> {
    let name = raw.trim().to_uppercase();
    if name.is_empty() {
        return Err(ServiceError::Validation("Role name is required".to_string()));
    }
    Ok(name)
}

fn parse_method(raw: &str) -> Result<HttpMethod, ServiceError> {
    raw.parse::<HttpMethod>().map_err(ServiceError::Validation)
}

fn route_path(raw: &str) -> Result<String, ServiceError> {
    let path = raw.trim();
    if !path.starts_with('/') {
        return Err(ServiceError::Validation(
            "Permission path must start with '/'".to_string(),
        ));
    }
    Ok(path.to_string())
}
