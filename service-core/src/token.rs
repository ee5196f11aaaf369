//! Signed bearer tokens for the identity trust boundary.
//!
//! Two token kinds share one signing key: session tokens (minted after a
//! successful second factor, inspected by the gateway on every protected call)
//! and password-reset tokens (mailed as a link). Both carry only the identity
//! id. Roles and permissions are never embedded, they are resolved live by
//! each service.
//!
//! Verification is pure computation and takes `now` explicitly so expiry
//! boundaries can be exercised deterministically.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::error::AppError;

pub const DEFAULT_SESSION_TTL_MINUTES: i64 = 120;
pub const DEFAULT_RESET_TTL_MINUTES: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    Session,
    PasswordReset,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Identity id
    pub sub: String,
    pub purpose: TokenPurpose,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("Token is malformed or has an invalid signature")]
    Malformed,
    #[error("Token has expired")]
    Expired,
}

impl From<TokenError> for AppError {
    fn from(_: TokenError) -> Self {
        // Callers learn nothing beyond "invalid or expired".
        AppError::Unauthorized(anyhow::anyhow!("Invalid or expired token"))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub secret: SecretString,
    pub session_ttl_minutes: i64,
    pub reset_ttl_minutes: i64,
}

impl TokenConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: SecretString::new(secret.into()),
            session_ttl_minutes: DEFAULT_SESSION_TTL_MINUTES,
            reset_ttl_minutes: DEFAULT_RESET_TTL_MINUTES,
        }
    }
}

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

/// HS256 issuer/verifier for session and password-reset tokens.
#[derive(Clone)]
pub struct TokenService {
    keys: Arc<Keys>,
    session_ttl: Duration,
    reset_ttl: Duration,
}

impl TokenService {
    pub fn new(config: &TokenConfig) -> Result<Self, AppError> {
        let secret = config.secret.expose_secret().as_bytes();
        if secret.len() < 32 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Token secret must be at least 32 bytes"
            )));
        }
        if config.session_ttl_minutes <= 0 || config.reset_ttl_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Token lifetimes must be positive"
            )));
        }

        tracing::info!(
            session_ttl_minutes = config.session_ttl_minutes,
            reset_ttl_minutes = config.reset_ttl_minutes,
            "Token service initialized with HS256 key"
        );

        Ok(Self {
            keys: Arc::new(Keys {
                encoding: EncodingKey::from_secret(secret),
                decoding: DecodingKey::from_secret(secret),
            }),
            session_ttl: Duration::minutes(config.session_ttl_minutes),
            reset_ttl: Duration::minutes(config.reset_ttl_minutes),
        })
    }

    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl.num_seconds()
    }

    pub fn reset_ttl_minutes(&self) -> i64 {
        self.reset_ttl.num_minutes()
    }

    pub fn issue_session(&self, identity_id: &str) -> Result<String, AppError> {
        self.issue_at(identity_id, TokenPurpose::Session, Utc::now())
    }

    pub fn verify_session(&self, token: &str) -> Result<String, TokenError> {
        self.verify_at(token, TokenPurpose::Session, Utc::now())
            .map(|claims| claims.sub)
    }

    pub fn issue_password_reset(&self, identity_id: &str) -> Result<String, AppError> {
        self.issue_at(identity_id, TokenPurpose::PasswordReset, Utc::now())
    }

    pub fn verify_password_reset(&self, token: &str) -> Result<String, TokenError> {
        self.verify_at(token, TokenPurpose::PasswordReset, Utc::now())
            .map(|claims| claims.sub)
    }

    /// Mint a token of the given purpose as if the clock read `now`.
    pub fn issue_at(
        &self,
        identity_id: &str,
        purpose: TokenPurpose,
        now: DateTime<Utc>,
    ) -> Result<String, AppError> {
        let ttl = match purpose {
            TokenPurpose::Session => self.session_ttl,
            TokenPurpose::PasswordReset => self.reset_ttl,
        };

        let claims = TokenClaims {
            sub: identity_id.to_string(),
            purpose,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.keys.encoding)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to encode token: {}", e)))
    }

    /// Check signature, structure and purpose, then expiry against `now`.
    pub fn verify_at(
        &self,
        token: &str,
        expected: TokenPurpose,
        now: DateTime<Utc>,
    ) -> Result<TokenClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked below against the supplied clock.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let claims = decode::<TokenClaims>(token, &self.keys.decoding, &validation)
            .map_err(|_| TokenError::Malformed)?
            .claims;

        if claims.purpose != expected || claims.sub.is_empty() {
            return Err(TokenError::Malformed);
        }

        if now.timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }
}
