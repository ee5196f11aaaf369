//! Identity model - a registered account and its two single-use code slots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Account lifecycle. New accounts stay `PENDING` until their sign-up code
/// is consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum IdentityStatus {
    Pending,
    Active,
    Inactive,
}

impl IdentityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityStatus::Pending => "PENDING",
            IdentityStatus::Active => "ACTIVE",
            IdentityStatus::Inactive => "INACTIVE",
        }
    }
}

impl std::fmt::Display for IdentityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a verification code was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CodePurpose {
    SignupVerify,
    SecondFactor,
    Resend,
}

impl CodePurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodePurpose::SignupVerify => "signup-verify",
            CodePurpose::SecondFactor => "second-factor",
            CodePurpose::Resend => "resend",
        }
    }
}

/// Sign-up / second-factor code slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneTimeCode {
    pub code: String,
    pub purpose: CodePurpose,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResetStatus {
    Pending,
    Verified,
}

impl ResetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResetStatus::Pending => "PENDING",
            ResetStatus::Verified => "VERIFIED",
        }
    }
}

/// Code-based password reset slot. Never shares storage with [`OneTimeCode`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetCode {
    pub code: String,
    pub status: ResetStatus,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    #[serde(rename = "_id")]
    pub id: String,
    pub fullname: String,
    /// Trimmed and lowercased.
    pub email: String,
    pub phone: String,
    pub password_hash: String,
    pub status: IdentityStatus,
    pub role_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_id: Option<String>,
    #[serde(default)]
    pub verification: Option<OneTimeCode>,
    #[serde(default)]
    pub reset: Option<ResetCode>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_utc: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_utc: DateTime<Utc>,
}

impl Identity {
    /// A fresh `PENDING` account with no outstanding codes.
    pub fn new(
        fullname: String,
        email: String,
        phone: String,
        password_hash: String,
        role_id: String,
        location_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            fullname,
            email,
            phone,
            password_hash,
            status: IdentityStatus::Pending,
            role_id,
            location_id,
            verification: None,
            reset: None,
            created_utc: now,
            updated_utc: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == IdentityStatus::Active
    }
}
