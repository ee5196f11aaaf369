use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::{
        admin::{CreatePermissionRequest, PermissionResponse, UpdatePermissionRequest},
        MessageResponse,
    },
    utils::ValidatedJson,
    AppState,
};

/// List permissions
#[utoipa::path(
    get,
    path = "/permissions",
    responses(
        (status = 200, description = "All permissions", body = [PermissionResponse]),
        (status = 403, description = "Permission denied", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Permissions"
)]
pub async fn list_permissions(
    State(state): State<AppState>,
) -> Result<Json<Vec<PermissionResponse>>, AppError> {
    let permissions = state.admin_service.list_permissions().await?;
    Ok(Json(permissions.into_iter().map(Into::into).collect()))
}

/// Register a permission
///
/// `path` is a route template such as `/roles/:id`, matched exactly.
#[utoipa::path(
    post,
    path = "/permissions",
    request_body = CreatePermissionRequest,
    responses(
        (status = 201, description = "Permission created", body = PermissionResponse),
        (status = 400, description = "Invalid input or duplicate (name, path, method)", body = ErrorResponse),
        (status = 403, description = "Permission denied", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Permissions"
)]
pub async fn create_permission(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<CreatePermissionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let permission = state.admin_service.create_permission(req).await?;
    Ok((StatusCode::CREATED, Json(PermissionResponse::from(permission))))
}

/// Get a permission
#[utoipa::path(
    get,
    path = "/permissions/{id}",
    params(("id" = String, Path, description = "Permission id")),
    responses(
        (status = 200, description = "Permission", body = PermissionResponse),
        (status = 403, description = "Permission denied", body = ErrorResponse),
        (status = 404, description = "Permission not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Permissions"
)]
pub async fn get_permission(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PermissionResponse>, AppError> {
    let permission = state.admin_service.get_permission(&id).await?;
    Ok(Json(permission.into()))
}

/// Update a permission
#[utoipa::path(
    put,
    path = "/permissions/{id}",
    params(("id" = String, Path, description = "Permission id")),
    request_body = UpdatePermissionRequest,
    responses(
        (status = 200, description = "Permission updated", body = PermissionResponse),
        (status = 400, description = "Invalid input or duplicate (name, path, method)", body = ErrorResponse),
        (status = 403, description = "Permission denied", body = ErrorResponse),
        (status = 404, description = "Permission not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Permissions"
)]
pub async fn update_permission(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdatePermissionRequest>,
) -> Result<Json<PermissionResponse>, AppError> {
    let permission = state.admin_service.update_permission(&id, req).await?;
    Ok(Json(permission.into()))
}

/// Delete a permission
///
/// Also removes it from every role that grants it.
#[utoipa::path(
    delete,
    path = "/permissions/{id}",
    params(("id" = String, Path, description = "Permission id")),
    responses(
        (status = 200, description = "Permission deleted", body = MessageResponse),
        (status = 403, description = "Permission denied", body = ErrorResponse),
        (status = 404, description = "Permission not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Permissions"
)]
pub async fn delete_permission(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    state.admin_service.delete_permission(&id).await?;
    Ok(Json(MessageResponse::new("Permission deleted")))
}
