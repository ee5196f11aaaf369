//! Credential store: the single source of truth for identities, roles and
//! permissions.
//!
//! Every read-modify-write on an identity's code slots goes through one of
//! the conditional updates below. Each succeeds only if the slot still holds
//! the value the caller checked, so two racing consumers cannot both win.

mod memory;
mod mongo;

pub use memory::InMemoryCredentialStore;
pub use mongo::MongoCredentialStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{
    HttpMethod, Identity, IdentityStatus, OneTimeCode, Permission, ResetCode, Role,
};

#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint was violated. Carries the offending field.
    #[error("{0} already exists")]
    AlreadyExists(&'static str),

    #[error("Database error: {0}")]
    Database(anyhow::Error),
}

impl From<StoreError> for service_core::error::AppError {
    fn from(err: StoreError) -> Self {
        service_core::error::AppError::DatabaseError(anyhow::anyhow!("{}", err))
    }
}

impl From<mongodb::error::Error> for StoreError {
    fn from(err: mongodb::error::Error) -> Self {
        StoreError::Database(anyhow::Error::new(err))
    }
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn health_check(&self) -> Result<(), StoreError>;

    // Identities

    /// Fails with `AlreadyExists("email" | "phone")` on a duplicate.
    async fn insert_identity(&self, identity: &Identity) -> Result<(), StoreError>;
    async fn find_identity_by_id(&self, id: &str) -> Result<Option<Identity>, StoreError>;
    async fn find_identity_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError>;
    async fn find_identity_by_phone(&self, phone: &str) -> Result<Option<Identity>, StoreError>;
    async fn list_identities(&self) -> Result<Vec<Identity>, StoreError>;
    async fn delete_identity(&self, id: &str) -> Result<bool, StoreError>;
    async fn count_identities_with_role(&self, role_id: &str) -> Result<u64, StoreError>;
    async fn set_identity_role(&self, id: &str, role_id: &str) -> Result<bool, StoreError>;
    async fn set_identity_status(&self, id: &str, status: IdentityStatus)
        -> Result<bool, StoreError>;
    async fn update_password(&self, id: &str, password_hash: &str) -> Result<bool, StoreError>;

    /// Replace the verification slot, discarding any outstanding code.
    async fn set_verification_code(&self, id: &str, code: &OneTimeCode)
        -> Result<bool, StoreError>;

    /// Clear the verification slot if it still holds `code`, optionally
    /// moving a `PENDING` identity to `ACTIVE` in the same write.
    async fn consume_verification_code(
        &self,
        id: &str,
        code: &str,
        activate: bool,
    ) -> Result<bool, StoreError>;

    async fn set_reset_code(&self, id: &str, code: &ResetCode) -> Result<bool, StoreError>;

    /// `PENDING -> VERIFIED` if the reset slot still holds `code`.
    async fn mark_reset_code_verified(&self, id: &str, code: &str) -> Result<bool, StoreError>;

    /// Set the password and clear the reset slot if it is `VERIFIED`.
    async fn replace_password_after_reset(
        &self,
        id: &str,
        password_hash: &str,
    ) -> Result<bool, StoreError>;

    // Roles

    /// Fails with `AlreadyExists("role")` on a duplicate name.
    async fn insert_role(&self, role: &Role) -> Result<(), StoreError>;
    async fn find_role_by_id(&self, id: &str) -> Result<Option<Role>, StoreError>;
    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, StoreError>;
    async fn list_roles(&self) -> Result<Vec<Role>, StoreError>;
    async fn update_role(&self, role: &Role) -> Result<bool, StoreError>;
    async fn delete_role(&self, id: &str) -> Result<bool, StoreError>;

    // Permissions

    /// Fails with `AlreadyExists("permission")` on a duplicate
    /// (name, path, method) triple.
    async fn insert_permission(&self, permission: &Permission) -> Result<(), StoreError>;
    async fn find_permission_by_id(&self, id: &str) -> Result<Option<Permission>, StoreError>;
    async fn find_permission(
        &self,
        name: &str,
        path: &str,
        method: HttpMethod,
    ) -> Result<Option<Permission>, StoreError>;
    async fn find_permissions_by_ids(&self, ids: &[String])
        -> Result<Vec<Permission>, StoreError>;
    async fn list_permissions(&self) -> Result<Vec<Permission>, StoreError>;
    async fn update_permission(&self, permission: &Permission) -> Result<bool, StoreError>;

    /// Delete the permission and drop it from every role that grants it.
    async fn delete_permission(&self, id: &str) -> Result<bool, StoreError>;
}
