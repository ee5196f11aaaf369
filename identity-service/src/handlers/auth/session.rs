use axum::{extract::State, Json};
use service_core::{error::AppError, middleware::session::AuthIdentity};

use crate::{
    dtos::{
        auth::{ChangePasswordRequest, CodeRequest, MeResponse, SessionResponse, SigninRequest},
        MessageResponse,
    },
    utils::ValidatedJson,
    AppState,
};

/// Sign in, step one
///
/// Checks the password and sends a second-factor code over `methodContact`.
#[utoipa::path(
    post,
    path = "/auth/signin",
    request_body = SigninRequest,
    responses(
        (status = 200, description = "Code sent", body = MessageResponse),
        (status = 400, description = "Invalid credentials, email format or contact method", body = ErrorResponse),
        (status = 404, description = "Unknown email", body = ErrorResponse),
        (status = 429, description = "Too many sign-in attempts", body = ErrorResponse),
        (status = 500, description = "Code could not be sent", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn signin(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<SigninRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let message = state.auth_service.signin(req).await?;
    Ok(Json(MessageResponse::new(message)))
}

/// Sign in, step two
///
/// Exchanges the second-factor code for a session token.
#[utoipa::path(
    post,
    path = "/auth/second-factor",
    request_body = CodeRequest,
    responses(
        (status = 200, description = "Signed in", body = SessionResponse),
        (status = 400, description = "Code expired or invalid", body = ErrorResponse),
        (status = 404, description = "Unknown email", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn second_factor(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<CodeRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    let res = state.auth_service.second_factor(req).await?;
    Ok(Json(res))
}

/// Current identity
#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Signed-in identity", body = MeResponse),
        (status = 401, description = "Missing or invalid session", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Session"
)]
pub async fn me(
    State(state): State<AppState>,
    identity: AuthIdentity,
) -> Result<Json<MeResponse>, AppError> {
    let res = state.auth_service.me(&identity.identity_id).await?;
    Ok(Json(res))
}

/// Change the password of the signed-in identity
#[utoipa::path(
    post,
    path = "/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Wrong current password, mismatch or weak password", body = ErrorResponse),
        (status = 401, description = "Missing or invalid session", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Session"
)]
pub async fn change_password(
    State(state): State<AppState>,
    identity: AuthIdentity,
    ValidatedJson(req): ValidatedJson<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    state
        .auth_service
        .change_password(&identity.identity_id, req)
        .await?;
    Ok(Json(MessageResponse::new("Password changed successfully")))
}
