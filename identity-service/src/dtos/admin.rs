use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::{Identity, Permission, Role};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PermissionResponse {
    pub id: String,
    #[schema(example = "List roles")]
    pub name: String,
    #[schema(example = "roles")]
    pub category: String,
    #[schema(example = "GET")]
    pub method: String,
    #[schema(example = "/roles")]
    pub path: String,
    pub description: String,
}

impl From<Permission> for PermissionResponse {
    fn from(p: Permission) -> Self {
        Self {
            id: p.id,
            name: p.name,
            category: p.category,
            method: p.method.as_str().to_string(),
            path: p.path,
            description: p.description,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RoleResponse {
    pub id: String,
    #[schema(example = "ADMIN")]
    pub name: String,
    pub description: String,
    #[serde(rename = "permissionIds")]
    pub permission_ids: Vec<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl From<Role> for RoleResponse {
    fn from(r: Role) -> Self {
        Self {
            id: r.id,
            name: r.name,
            description: r.description,
            permission_ids: r.permission_ids,
            created_utc: r.created_utc,
            updated_utc: r.updated_utc,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: String,
    pub fullname: String,
    pub email: String,
    pub phone: String,
    #[schema(example = "ACTIVE")]
    pub status: String,
    #[serde(rename = "roleId")]
    pub role_id: String,
    #[serde(rename = "locationId", skip_serializing_if = "Option::is_none")]
    pub location_id: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl From<Identity> for UserResponse {
    fn from(i: Identity) -> Self {
        Self {
            id: i.id,
            fullname: i.fullname,
            email: i.email,
            phone: i.phone,
            status: i.status.as_str().to_string(),
            role_id: i.role_id,
            location_id: i.location_id,
            created_utc: i.created_utc,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateRoleRequest {
    #[validate(length(min = 1, max = 64, message = "Role name is required"))]
    #[schema(example = "SUPERVISOR")]
    pub name: String,

    #[serde(default)]
    #[validate(length(max = 500, message = "Description is too long"))]
    pub description: String,

    #[serde(rename = "permissionIds", default)]
    pub permission_ids: Vec<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateRoleRequest {
    #[validate(length(min = 1, max = 64, message = "Role name must not be empty"))]
    pub name: Option<String>,

    #[validate(length(max = 500, message = "Description is too long"))]
    pub description: Option<String>,

    #[serde(rename = "permissionIds")]
    pub permission_ids: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreatePermissionRequest {
    #[validate(length(min = 1, max = 120, message = "Permission name is required"))]
    #[schema(example = "List roles")]
    pub name: String,

    #[validate(length(min = 1, message = "Category is required"))]
    #[schema(example = "roles")]
    pub category: String,

    #[validate(length(min = 1, message = "Method is required"))]
    #[schema(example = "GET")]
    pub method: String,

    #[validate(length(min = 1, message = "Path is required"))]
    #[schema(example = "/roles")]
    pub path: String,

    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdatePermissionRequest {
    #[validate(length(min = 1, max = 120, message = "Permission name must not be empty"))]
    pub name: Option<String>,
    pub category: Option<String>,
    pub method: Option<String>,
    pub path: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AssignRoleRequest {
    #[serde(rename = "roleId")]
    #[validate(length(min = 1, message = "Role is required"))]
    pub role_id: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    #[schema(example = "INACTIVE")]
    pub status: crate::models::IdentityStatus,
}
