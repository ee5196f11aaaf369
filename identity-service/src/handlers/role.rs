use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::{
        admin::{CreateRoleRequest, RoleResponse, UpdateRoleRequest},
        MessageResponse,
    },
    utils::ValidatedJson,
    AppState,
};

/// List roles
#[utoipa::path(
    get,
    path = "/roles",
    responses(
        (status = 200, description = "All roles", body = [RoleResponse]),
        (status = 401, description = "Missing or invalid session", body = ErrorResponse),
        (status = 403, description = "Permission denied", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Roles"
)]
pub async fn list_roles(
    State(state): State<AppState>,
) -> Result<Json<Vec<RoleResponse>>, AppError> {
    let roles = state.admin_service.list_roles().await?;
    Ok(Json(roles.into_iter().map(Into::into).collect()))
}

/// Create a role
///
/// The name is trimmed and uppercased. Every permission id must exist.
#[utoipa::path(
    post,
    path = "/roles",
    request_body = CreateRoleRequest,
    responses(
        (status = 201, description = "Role created", body = RoleResponse),
        (status = 400, description = "Invalid input or duplicate name", body = ErrorResponse),
        (status = 403, description = "Permission denied", body = ErrorResponse),
        (status = 404, description = "Unknown permission id", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Roles"
)]
pub async fn create_role(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<CreateRoleRequest>,
) -> Result<impl IntoResponse, AppError> {
    let role = state.admin_service.create_role(req).await?;
    Ok((StatusCode::CREATED, Json(RoleResponse::from(role))))
}

/// Get a role
#[utoipa::path(
    get,
    path = "/roles/{id}",
    params(("id" = String, Path, description = "Role id")),
    responses(
        (status = 200, description = "Role", body = RoleResponse),
        (status = 403, description = "Permission denied", body = ErrorResponse),
        (status = 404, description = "Role not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Roles"
)]
pub async fn get_role(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RoleResponse>, AppError> {
    let role = state.admin_service.get_role(&id).await?;
    Ok(Json(role.into()))
}

/// Update a role
#[utoipa::path(
    put,
    path = "/roles/{id}",
    params(("id" = String, Path, description = "Role id")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Role updated", body = RoleResponse),
        (status = 400, description = "Invalid input or duplicate name", body = ErrorResponse),
        (status = 403, description = "Permission denied", body = ErrorResponse),
        (status = 404, description = "Role or permission not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Roles"
)]
pub async fn update_role(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateRoleRequest>,
) -> Result<Json<RoleResponse>, AppError> {
    let role = state.admin_service.update_role(&id, req).await?;
    Ok(Json(role.into()))
}

/// Delete a role
///
/// Refused while any user still holds the role.
#[utoipa::path(
    delete,
    path = "/roles/{id}",
    params(("id" = String, Path, description = "Role id")),
    responses(
        (status = 200, description = "Role deleted", body = MessageResponse),
        (status = 400, description = "Role is still assigned", body = ErrorResponse),
        (status = 403, description = "Permission denied", body = ErrorResponse),
        (status = 404, description = "Role not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Roles"
)]
pub async fn delete_role(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    state.admin_service.delete_role(&id).await?;
    Ok(Json(MessageResponse::new("Role deleted")))
}
