use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::{
    dtos::{
        auth::{CodeRequest, ResendCodeRequest, SignupRequest},
        MessageResponse,
    },
    utils::ValidatedJson,
    AppState,
};

/// Register a new account
///
/// The account stays `PENDING` until the emailed code is verified.
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Account created, verification code sent", body = SignupResponse),
        (status = 400, description = "Invalid input or email/phone already registered", body = ErrorResponse),
        (status = 429, description = "Too many sign-up attempts", body = ErrorResponse),
        (status = 500, description = "Verification code could not be sent", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn signup(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<SignupRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state.auth_service.signup(req).await?;
    Ok((StatusCode::CREATED, Json(res)))
}

/// Verify a new account with its code
#[utoipa::path(
    post,
    path = "/auth/verify",
    request_body = CodeRequest,
    responses(
        (status = 200, description = "Account activated", body = MessageResponse),
        (status = 400, description = "Code expired or invalid", body = ErrorResponse),
        (status = 404, description = "Unknown email", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn verify_account(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<CodeRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    state.auth_service.verify_signup(req).await?;
    Ok(Json(MessageResponse::new("Account verified successfully")))
}

/// Send a new verification code
#[utoipa::path(
    post,
    path = "/auth/resend-code",
    request_body = ResendCodeRequest,
    responses(
        (status = 200, description = "New code sent", body = MessageResponse),
        (status = 400, description = "Account already verified or unsupported channel", body = ErrorResponse),
        (status = 404, description = "Unknown email", body = ErrorResponse),
        (status = 500, description = "Code could not be sent", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn resend_code(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ResendCodeRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let message = state.auth_service.resend_code(req).await?;
    Ok(Json(MessageResponse::new(message)))
}
