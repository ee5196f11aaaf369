use axum::{extract::State, Json};
use service_core::error::AppError;

use crate::{
    dtos::{
        auth::{ChangePasswordWithCodeRequest, ChangeResetPasswordRequest, CodeRequest, EmailRequest},
        MessageResponse,
    },
    utils::ValidatedJson,
    AppState,
};

/// Email a password reset link
///
/// Works for accounts in any status.
#[utoipa::path(
    post,
    path = "/auth/password-reset/request",
    request_body = EmailRequest,
    responses(
        (status = 200, description = "Reset link sent", body = MessageResponse),
        (status = 400, description = "Invalid email format", body = ErrorResponse),
        (status = 404, description = "Unknown email", body = ErrorResponse),
        (status = 429, description = "Too many reset requests", body = ErrorResponse),
        (status = 500, description = "Reset email could not be sent", body = ErrorResponse)
    ),
    tag = "Password Reset"
)]
pub async fn request_password_reset(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<EmailRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    state
        .password_reset_service
        .request_reset(&req.email)
        .await?;
    Ok(Json(MessageResponse::new(
        "Check your email for the password reset link",
    )))
}

/// Set a new password with a reset link token
#[utoipa::path(
    post,
    path = "/auth/password-reset/change",
    request_body = ChangeResetPasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Mismatch, weak password or invalid token", body = ErrorResponse),
        (status = 404, description = "Account no longer exists", body = ErrorResponse)
    ),
    tag = "Password Reset"
)]
pub async fn change_reset_password(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ChangeResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    state
        .password_reset_service
        .change_with_token(&req.token, &req.new_password, &req.confirm_new_password)
        .await?;
    Ok(Json(MessageResponse::new("Password changed successfully")))
}

/// Email a password reset code
#[utoipa::path(
    post,
    path = "/auth/password-reset/code",
    request_body = EmailRequest,
    responses(
        (status = 200, description = "Reset code sent", body = MessageResponse),
        (status = 400, description = "Invalid email format", body = ErrorResponse),
        (status = 404, description = "Unknown email", body = ErrorResponse),
        (status = 429, description = "Too many reset requests", body = ErrorResponse),
        (status = 500, description = "Reset email could not be sent", body = ErrorResponse)
    ),
    tag = "Password Reset"
)]
pub async fn request_reset_code(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<EmailRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    state.password_reset_service.request_code(&req.email).await?;
    Ok(Json(MessageResponse::new(
        "Check your email for the password reset code",
    )))
}

/// Verify a password reset code
#[utoipa::path(
    post,
    path = "/auth/password-reset/verify-code",
    request_body = CodeRequest,
    responses(
        (status = 200, description = "Code verified", body = MessageResponse),
        (status = 400, description = "Code expired or invalid", body = ErrorResponse),
        (status = 404, description = "Unknown email", body = ErrorResponse)
    ),
    tag = "Password Reset"
)]
pub async fn verify_reset_code(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<CodeRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    state
        .password_reset_service
        .verify_code(&req.email, &req.code)
        .await?;
    Ok(Json(MessageResponse::new("Code verified, choose a new password")))
}

/// Set a new password after verifying a reset code
#[utoipa::path(
    post,
    path = "/auth/password-reset/change-with-code",
    request_body = ChangePasswordWithCodeRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Mismatch, weak password, or code not verified", body = ErrorResponse),
        (status = 404, description = "Unknown email", body = ErrorResponse)
    ),
    tag = "Password Reset"
)]
pub async fn change_password_with_code(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ChangePasswordWithCodeRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    state
        .password_reset_service
        .change_with_code(&req.email, &req.new_password, &req.confirm_new_password)
        .await?;
    Ok(Json(MessageResponse::new("Password changed successfully")))
}
