use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::{CredentialStore, StoreError};
use crate::models::{
    HttpMethod, Identity, IdentityStatus, OneTimeCode, Permission, ResetCode, ResetStatus, Role,
};

#[derive(Default)]
struct Collections {
    identities: HashMap<String, Identity>,
    roles: HashMap<String, Role>,
    permissions: HashMap<String, Permission>,
}

/// Process-local store with the same uniqueness and conditional-update
/// guarantees as the MongoDB store. Used by tests and local runs.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    inner: Mutex<Collections>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Collections>, StoreError> {
        self.inner
            .lock()
            .map_err(|e| StoreError::Database(anyhow::anyhow!("Store lock poisoned: {}", e)))
    }

    /// Apply `f` to the identity if present, bumping `updated_utc` when it
    /// reports a change.
    fn modify_identity<F>(&self, id: &str, f: F) -> Result<bool, StoreError>
    where
        F: FnOnce(&mut Identity) -> bool,
    {
        let mut guard = self.lock()?;
        match guard.identities.get_mut(id) {
            Some(identity) => {
                let changed = f(identity);
                if changed {
                    identity.updated_utc = Utc::now();
                }
                Ok(changed)
            }
            None => Ok(false),
        }
    }
}

fn sorted_by_created<T, F>(mut items: Vec<T>, key: F) -> Vec<T>
where
    F: Fn(&T) -> chrono::DateTime<Utc>,
{
    items.sort_by_key(|item| key(item));
    items
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }

    async fn insert_identity(&self, identity: &Identity) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        if guard.identities.values().any(|i| i.email == identity.email) {
            return Err(StoreError::AlreadyExists("email"));
        }
        if guard.identities.values().any(|i| i.phone == identity.phone) {
            return Err(StoreError::AlreadyExists("phone"));
        }
        guard
            .identities
            .insert(identity.id.clone(), identity.clone());
        Ok(())
    }

    async fn find_identity_by_id(&self, id: &str) -> Result<Option<Identity>, StoreError> {
        Ok(self.lock()?.identities.get(id).cloned())
    }

    async fn find_identity_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        Ok(self
            .lock()?
            .identities
            .values()
            .find(|i| i.email == email)
            .cloned())
    }

    async fn find_identity_by_phone(&self, phone: &str) -> Result<Option<Identity>, StoreError> {
        Ok(self
            .lock()?
            .identities
            .values()
            .find(|i| i.phone == phone)
            .cloned())
    }

    async fn list_identities(&self) -> Result<Vec<Identity>, StoreError> {
        let items: Vec<Identity> = self.lock()?.identities.values().cloned().collect();
        Ok(sorted_by_created(items, |i: &Identity| i.created_utc))
    }

    async fn delete_identity(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.lock()?.identities.remove(id).is_some())
    }

    async fn count_identities_with_role(&self, role_id: &str) -> Result<u64, StoreError> {
        Ok(self
            .lock()?
            .identities
            .values()
            .filter(|i| i.role_id == role_id)
            .count() as u64)
    }

    async fn set_identity_role(&self, id: &str, role_id: &str) -> Result<bool, StoreError> {
        self.modify_identity(id, |identity| {
            identity.role_id = role_id.to_string();
            true
        })
    }

    async fn set_identity_status(
        &self,
        id: &str,
        status: IdentityStatus,
    ) -> Result<bool, StoreError> {
        self.modify_identity(id, |identity| {
            identity.status = status;
            true
        })
    }

    async fn update_password(&self, id: &str, password_hash: &str) -> Result<bool, StoreError> {
        self.modify_identity(id, |identity| {
            identity.password_hash = password_hash.to_string();
            true
        })
    }

    async fn set_verification_code(
        &self,
        id: &str,
        code: &OneTimeCode,
    ) -> Result<bool, StoreError> {
        self.modify_identity(id, |identity| {
            identity.verification = Some(code.clone());
            true
        })
    }

    async fn consume_verification_code(
        &self,
        id: &str,
        code: &str,
        activate: bool,
    ) -> Result<bool, StoreError> {
        self.modify_identity(id, |identity| {
            let holds = identity
                .verification
                .as_ref()
                .is_some_and(|slot| slot.code == code);
            if !holds {
                return false;
            }
            identity.verification = None;
            if activate && identity.status == IdentityStatus::Pending {
                identity.status = IdentityStatus::Active;
            }
            true
        })
    }

    async fn set_reset_code(&self, id: &str, code: &ResetCode) -> Result<bool, StoreError> {
        self.modify_identity(id, |identity| {
            identity.reset = Some(code.clone());
            true
        })
    }

    async fn mark_reset_code_verified(&self, id: &str, code: &str) -> Result<bool, StoreError> {
        self.modify_identity(id, |identity| match identity.reset.as_mut() {
            Some(slot) if slot.code == code && slot.status == ResetStatus::Pending => {
                slot.status = ResetStatus::Verified;
                true
            }
            _ => false,
        })
    }

    async fn replace_password_after_reset(
        &self,
        id: &str,
        password_hash: &str,
    ) -> Result<bool, StoreError> {
        self.modify_identity(id, |identity| {
            let verified = identity
                .reset
                .as_ref()
                .is_some_and(|slot| slot.status == ResetStatus::Verified);
            if !verified {
                return false;
            }
            identity.password_hash = password_hash.to_string();
            identity.reset = None;
            true
        })
    }

    async fn insert_role(&self, role: &Role) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        if guard.roles.values().any(|r| r.name == role.name) {
            return Err(StoreError::AlreadyExists("role"));
        }
        guard.roles.insert(role.id.clone(), role.clone());
        Ok(())
    }

    async fn find_role_by_id(&self, id: &str) -> Result<Option<Role>, StoreError> {
        Ok(self.lock()?.roles.get(id).cloned())
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, StoreError> {
        Ok(self
            .lock()?
            .roles
            .values()
            .find(|r| r.name == name)
            .cloned())
    }

    async fn list_roles(&self) -> Result<Vec<Role>, StoreError> {
        let items: Vec<Role> = self.lock()?.roles.values().cloned().collect();
        Ok(sorted_by_created(items, |r: &Role| r.created_utc))
    }

    async fn update_role(&self, role: &Role) -> Result<bool, StoreError> {
        let mut guard = self.lock()?;
        if guard
            .roles
            .values()
            .any(|r| r.id != role.id && r.name == role.name)
        {
            return Err(StoreError::AlreadyExists("role"));
        }
        match guard.roles.get_mut(&role.id) {
            Some(existing) => {
                *existing = role.clone();
                existing.updated_utc = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_role(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.lock()?.roles.remove(id).is_some())
    }

    async fn insert_permission(&self, permission: &Permission) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        if guard
            .permissions
            .values()
            .any(|p| p.same_triple(permission))
        {
            return Err(StoreError::AlreadyExists("permission"));
        }
        guard
            .permissions
            .insert(permission.id.clone(), permission.clone());
        Ok(())
    }

    async fn find_permission_by_id(&self, id: &str) -> Result<Option<Permission>, StoreError> {
        Ok(self.lock()?.permissions.get(id).cloned())
    }

    async fn find_permission(
        &self,
        name: &str,
        path: &str,
        method: HttpMethod,
    ) -> Result<Option<Permission>, StoreError> {
        Ok(self
            .lock()?
            .permissions
            .values()
            .find(|p| p.name == name && p.path == path && p.method == method)
            .cloned())
    }

    async fn find_permissions_by_ids(
        &self,
        ids: &[String],
    ) -> Result<Vec<Permission>, StoreError> {
        let guard = self.lock()?;
        let items = ids
            .iter()
            .filter_map(|id| guard.permissions.get(id).cloned())
            .collect();
        Ok(items)
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>, StoreError> {
        let items: Vec<Permission> = self.lock()?.permissions.values().cloned().collect();
        Ok(sorted_by_created(items, |p: &Permission| p.created_utc))
    }

    async fn update_permission(&self, permission: &Permission) -> Result<bool, StoreError> {
        let mut guard = self.lock()?;
        if guard
            .permissions
            .values()
            .any(|p| p.id != permission.id && p.same_triple(permission))
        {
            return Err(StoreError::AlreadyExists("permission"));
        }
        match guard.permissions.get_mut(&permission.id) {
            Some(existing) => {
                *existing = permission.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_permission(&self, id: &str) -> Result<bool, StoreError> {
        let mut guard = self.lock()?;
        if guard.permissions.remove(id).is_none() {
            return Ok(false);
        }
        for role in guard.roles.values_mut() {
            role.permission_ids.retain(|pid| pid != id);
        }
        Ok(true)
    }
}
