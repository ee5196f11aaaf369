use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::{
        admin::{AssignRoleRequest, UpdateStatusRequest, UserResponse},
        MessageResponse,
    },
    utils::ValidatedJson,
    AppState,
};

/// List users
#[utoipa::path(
    get,
    path = "/users",
    responses(
        (status = 200, description = "All users", body = [UserResponse]),
        (status = 403, description = "Permission denied", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn list_users(
    State(state): State<AppState>,
) -> Result<Json<Vec<UserResponse>>, AppError> {
    let users = state.admin_service.list_identities().await?;
    Ok(Json(users.into_iter().map(Into::into).collect()))
}

/// Get a user
#[utoipa::path(
    get,
    path = "/users/{id}",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "User", body = UserResponse),
        (status = 403, description = "Permission denied", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>, AppError> {
    let user = state.admin_service.get_identity(&id).await?;
    Ok(Json(user.into()))
}

/// Delete a user
#[utoipa::path(
    delete,
    path = "/users/{id}",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "User deleted", body = MessageResponse),
        (status = 403, description = "Permission denied", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    state.admin_service.delete_identity(&id).await?;
    Ok(Json(MessageResponse::new("User deleted")))
}

/// Assign a role to a user
#[utoipa::path(
    put,
    path = "/users/{id}/role",
    params(("id" = String, Path, description = "User id")),
    request_body = AssignRoleRequest,
    responses(
        (status = 200, description = "Role assigned", body = UserResponse),
        (status = 403, description = "Permission denied", body = ErrorResponse),
        (status = 404, description = "User or role not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn assign_role(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<AssignRoleRequest>,
) -> Result<Json<UserResponse>, AppError> {
    let user = state.admin_service.assign_role(&id, &req.role_id).await?;
    Ok(Json(user.into()))
}

/// Activate or deactivate a user
#[utoipa::path(
    put,
    path = "/users/{id}/status",
    params(("id" = String, Path, description = "User id")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status changed", body = UserResponse),
        (status = 400, description = "Unknown status", body = ErrorResponse),
        (status = 403, description = "Permission denied", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<UserResponse>, AppError> {
    let user = state.admin_service.set_status(&id, req.status).await?;
    Ok(Json(user.into()))
}
