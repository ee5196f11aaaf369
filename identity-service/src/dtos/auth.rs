use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::dtos::admin::PermissionResponse;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SignupRequest {
    #[validate(length(min = 1, max = 120, message = "Full name is required"))]
    #[schema(example = "Ana")]
    pub fullname: String,

    #[validate(length(min = 1, message = "Email is required"))]
    #[schema(example = "ana@test.com")]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    #[schema(example = "Abcdef1!", min_length = 7)]
    pub current_password: String,

    #[validate(length(min = 1, message = "Phone number is required"))]
    #[schema(example = "3001234567")]
    pub number: String,

    #[serde(rename = "ciudadId", alias = "locationId")]
    #[validate(length(min = 1, message = "Location is required"))]
    #[schema(example = "city-1")]
    pub location_id: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SignupResponse {
    #[schema(example = "Account created. Check your email to verify it.")]
    pub message: String,
    #[serde(rename = "userId")]
    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub user_id: String,
    #[schema(example = "ana@test.com")]
    pub email: String,
}

/// Email plus a six-digit code. Used by account verification, the second
/// factor and the code-based password reset.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CodeRequest {
    #[validate(length(min = 1, message = "Email is required"))]
    #[schema(example = "ana@test.com")]
    pub email: String,

    #[validate(length(min = 1, message = "Code is required"))]
    #[schema(example = "123456")]
    pub code: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ResendCodeRequest {
    #[validate(length(min = 1, message = "Email is required"))]
    #[schema(example = "ana@test.com")]
    pub email: String,

    /// `email` (default) or `sms`.
    #[serde(rename = "methodContact", default)]
    #[schema(example = "email")]
    pub method_contact: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SigninRequest {
    #[validate(length(min = 1, message = "Email is required"))]
    #[schema(example = "ana@test.com")]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    #[schema(example = "Abcdef1!")]
    pub current_password: String,

    /// `email` or `sms`.
    #[serde(rename = "methodContact")]
    #[validate(length(min = 1, message = "Contact method is required"))]
    #[schema(example = "sms")]
    pub method_contact: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionResponse {
    #[schema(example = "Signed in successfully")]
    pub message: String,
    pub token: String,
    /// Seconds until the token expires.
    #[schema(example = 7200)]
    pub expires_in: i64,
    #[schema(example = "CUSTOMER")]
    pub role: String,
    pub permissions: Vec<PermissionResponse>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct EmailRequest {
    #[validate(length(min = 1, message = "Email is required"))]
    #[schema(example = "ana@test.com")]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChangeResetPasswordRequest {
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,

    #[serde(rename = "newPassword")]
    #[validate(length(min = 1, message = "New password is required"))]
    pub new_password: String,

    #[serde(rename = "confirmNewPassword")]
    #[validate(length(min = 1, message = "Password confirmation is required"))]
    pub confirm_new_password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChangePasswordWithCodeRequest {
    #[validate(length(min = 1, message = "Email is required"))]
    #[schema(example = "ana@test.com")]
    pub email: String,

    #[serde(rename = "newPassword")]
    #[validate(length(min = 1, message = "New password is required"))]
    pub new_password: String,

    #[serde(rename = "confirmNewPassword")]
    #[validate(length(min = 1, message = "Password confirmation is required"))]
    pub confirm_new_password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChangePasswordRequest {
    #[serde(rename = "currentPassword")]
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,

    #[serde(rename = "newPassword")]
    #[validate(length(min = 1, message = "New password is required"))]
    pub new_password: String,

    #[serde(rename = "confirmNewPassword")]
    #[validate(length(min = 1, message = "Password confirmation is required"))]
    pub confirm_new_password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MeResponse {
    pub id: String,
    pub fullname: String,
    pub email: String,
    pub phone: String,
    #[schema(example = "ACTIVE")]
    pub status: String,
    #[schema(example = "CUSTOMER")]
    pub role: String,
    #[serde(rename = "locationId", skip_serializing_if = "Option::is_none")]
    pub location_id: Option<String>,
}
