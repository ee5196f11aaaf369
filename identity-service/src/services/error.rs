use service_core::error::AppError;
use thiserror::Error;

use crate::db::StoreError;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("Invalid email format")]
    InvalidEmailFormat,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Email already registered")]
    EmailAlreadyRegistered,

    #[error("Phone number already registered")]
    PhoneAlreadyRegistered,

    #[error("{0}")]
    Conflict(String),

    #[error("Invalid email or password")]
    BadCredentials,

    #[error("The account has not been verified")]
    AccountNotActive,

    #[error("Unsupported contact method, use 'email' or 'sms'")]
    UnsupportedChannel,

    #[error("The code has expired, request a new one")]
    CodeExpired,

    #[error("The code is not valid")]
    CodeMismatch,

    #[error("The passwords do not match")]
    PasswordMismatch,

    #[error("{0}")]
    WeakPassword(&'static str),

    #[error("The new password has to be different")]
    SamePassword,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("The reset code has not been verified")]
    ResetNotVerified,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("You do not have permission to perform this action")]
    Forbidden,

    #[error("Role not found")]
    RoleNotFound,

    #[error("{0}")]
    DependencyFailure(String),

    #[error("Database error: {0}")]
    Store(anyhow::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AlreadyExists("email") => ServiceError::EmailAlreadyRegistered,
            StoreError::AlreadyExists("phone") => ServiceError::PhoneAlreadyRegistered,
            StoreError::AlreadyExists("role") => {
                ServiceError::Conflict("A role with that name already exists".to_string())
            }
            StoreError::AlreadyExists("permission") => ServiceError::Conflict(
                "A permission with that name, path and method already exists".to_string(),
            ),
            StoreError::AlreadyExists(field) => {
                ServiceError::Conflict(format!("{} already exists", field))
            }
            StoreError::Database(e) => ServiceError::Store(e),
        }
    }
}

impl From<AppError> for ServiceError {
    fn from(err: AppError) -> Self {
        ServiceError::Internal(anyhow::Error::new(err))
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        match err {
            ServiceError::Validation(_)
            | ServiceError::InvalidEmailFormat
            | ServiceError::BadCredentials
            | ServiceError::AccountNotActive
            | ServiceError::UnsupportedChannel
            | ServiceError::CodeExpired
            | ServiceError::CodeMismatch
            | ServiceError::PasswordMismatch
            | ServiceError::WeakPassword(_)
            | ServiceError::SamePassword
            | ServiceError::InvalidToken
            | ServiceError::ResetNotVerified => AppError::BadRequest(anyhow::anyhow!(message)),
            ServiceError::NotFound(_) | ServiceError::RoleNotFound => {
                AppError::NotFound(anyhow::anyhow!(message))
            }
            ServiceError::EmailAlreadyRegistered
            | ServiceError::PhoneAlreadyRegistered
            | ServiceError::Conflict(_) => AppError::Conflict(anyhow::anyhow!(message)),
            ServiceError::Unauthorized => AppError::Unauthorized(anyhow::anyhow!(message)),
            ServiceError::Forbidden => AppError::Forbidden(anyhow::anyhow!(message)),
            ServiceError::DependencyFailure(msg) => AppError::DependencyFailure(msg),
            ServiceError::Store(e) => AppError::DatabaseError(e),
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use service_core::axum::http::StatusCode;

    #[test]
    fn duplicate_keys_become_conflicts_reported_as_400() {
        let err: ServiceError = StoreError::AlreadyExists("email").into();
        assert!(matches!(err, ServiceError::EmailAlreadyRegistered));
        assert_eq!(AppError::from(err).status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn code_failures_are_client_errors() {
        for err in [ServiceError::CodeExpired, ServiceError::CodeMismatch] {
            assert_eq!(AppError::from(err).status_code(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn authorization_failures_keep_their_status() {
        assert_eq!(
            AppError::from(ServiceError::Unauthorized).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::from(ServiceError::Forbidden).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::from(ServiceError::NotFound("User")).status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn dispatch_failures_are_server_errors() {
        let err = ServiceError::DependencyFailure("Failed to send the code".to_string());
        assert_eq!(
            AppError::from(err).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
