use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, to_bson, DateTime as BsonDateTime, Document},
    error::{ErrorKind, WriteFailure},
    options::{FindOptions, IndexOptions},
    Client as MongoClient, Collection, Database, IndexModel,
};

use super::{CredentialStore, StoreError};
use crate::models::{
    HttpMethod, Identity, IdentityStatus, OneTimeCode, Permission, ResetCode, ResetStatus, Role,
};

const DUPLICATE_KEY: i32 = 11000;

const IDENTITY_EMAIL_INDEX: &str = "identity_email_unique";
const IDENTITY_PHONE_INDEX: &str = "identity_phone_unique";
const ROLE_NAME_INDEX: &str = "role_name_unique";
const PERMISSION_TRIPLE_INDEX: &str = "permission_triple_unique";

#[derive(Clone)]
pub struct MongoCredentialStore {
    client: MongoClient,
    db: Database,
}

/// Map a duplicate-key failure to the field whose unique index fired.
fn classify(err: mongodb::error::Error) -> StoreError {
    let message = match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) if e.code == DUPLICATE_KEY => {
            Some(e.message.clone())
        }
        ErrorKind::Command(e) if e.code == DUPLICATE_KEY => Some(e.message.clone()),
        _ => None,
    };

    match message {
        Some(m) if m.contains(IDENTITY_EMAIL_INDEX) => StoreError::AlreadyExists("email"),
        Some(m) if m.contains(IDENTITY_PHONE_INDEX) => StoreError::AlreadyExists("phone"),
        Some(m) if m.contains(ROLE_NAME_INDEX) => StoreError::AlreadyExists("role"),
        Some(m) if m.contains(PERMISSION_TRIPLE_INDEX) => StoreError::AlreadyExists("permission"),
        Some(_) => StoreError::AlreadyExists("record"),
        None => StoreError::from(err),
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<mongodb::bson::Bson, StoreError> {
    to_bson(value).map_err(|e| StoreError::Database(anyhow::Error::new(e)))
}

fn unique_index(keys: Document, name: &str) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(
            IndexOptions::builder()
                .name(name.to_string())
                .unique(true)
                .build(),
        )
        .build()
}

impl MongoCredentialStore {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, StoreError> {
        tracing::info!("Connecting to MongoDB");
        let client = MongoClient::with_uri_str(uri).await.map_err(|e| {
            tracing::error!("Failed to connect to MongoDB: {}", e);
            StoreError::from(e)
        })?;
        let db = client.database(database);
        tracing::info!(database = %database, "Successfully connected to MongoDB database");
        Ok(Self { client, db })
    }

    pub async fn initialize_indexes(&self) -> Result<(), StoreError> {
        tracing::info!("Creating MongoDB indexes for identity-service");

        let identity_indexes = [
            unique_index(doc! { "email": 1 }, IDENTITY_EMAIL_INDEX),
            unique_index(doc! { "phone": 1 }, IDENTITY_PHONE_INDEX),
            IndexModel::builder()
                .keys(doc! { "role_id": 1 })
                .options(
                    IndexOptions::builder()
                        .name("identity_role_idx".to_string())
                        .build(),
                )
                .build(),
        ];
        for index in identity_indexes {
            self.identities().create_index(index, None).await?;
        }

        self.roles()
            .create_index(unique_index(doc! { "name": 1 }, ROLE_NAME_INDEX), None)
            .await?;

        self.permissions()
            .create_index(
                unique_index(
                    doc! { "name": 1, "path": 1, "method": 1 },
                    PERMISSION_TRIPLE_INDEX,
                ),
                None,
            )
            .await?;

        tracing::info!("Successfully created all MongoDB indexes");
        Ok(())
    }

    fn identities(&self) -> Collection<Identity> {
        self.db.collection("identities")
    }

    fn roles(&self) -> Collection<Role> {
        self.db.collection("roles")
    }

    fn permissions(&self) -> Collection<Permission> {
        self.db.collection("permissions")
    }

    async fn update_identity(&self, filter: Document, set: Document) -> Result<bool, StoreError> {
        let result = self
            .identities()
            .update_one(filter, doc! { "$set": set }, None)
            .await
            .map_err(classify)?;
        Ok(result.modified_count == 1)
    }
}

#[async_trait]
impl CredentialStore for MongoCredentialStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| {
                tracing::error!("MongoDB health check failed: {}", e);
                StoreError::from(e)
            })?;
        Ok(())
    }

    async fn insert_identity(&self, identity: &Identity) -> Result<(), StoreError> {
        self.identities()
            .insert_one(identity, None)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn find_identity_by_id(&self, id: &str) -> Result<Option<Identity>, StoreError> {
        Ok(self.identities().find_one(doc! { "_id": id }, None).await?)
    }

    async fn find_identity_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        Ok(self
            .identities()
            .find_one(doc! { "email": email }, None)
            .await?)
    }

    async fn find_identity_by_phone(&self, phone: &str) -> Result<Option<Identity>, StoreError> {
        Ok(self
            .identities()
            .find_one(doc! { "phone": phone }, None)
            .await?)
    }

    async fn list_identities(&self) -> Result<Vec<Identity>, StoreError> {
        let options = FindOptions::builder().sort(doc! { "created_utc": 1 }).build();
        let cursor = self.identities().find(doc! {}, options).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn delete_identity(&self, id: &str) -> Result<bool, StoreError> {
        let result = self
            .identities()
            .delete_one(doc! { "_id": id }, None)
            .await?;
        Ok(result.deleted_count == 1)
    }

    async fn count_identities_with_role(&self, role_id: &str) -> Result<u64, StoreError> {
        Ok(self
            .identities()
            .count_documents(doc! { "role_id": role_id }, None)
            .await?)
    }

    async fn set_identity_role(&self, id: &str, role_id: &str) -> Result<bool, StoreError> {
        self.update_identity(
            doc! { "_id": id },
            doc! { "role_id": role_id, "updated_utc": BsonDateTime::now() },
        )
        .await
    }

    async fn set_identity_status(
        &self,
        id: &str,
        status: IdentityStatus,
    ) -> Result<bool, StoreError> {
        self.update_identity(
            doc! { "_id": id },
            doc! { "status": status.as_str(), "updated_utc": BsonDateTime::now() },
        )
        .await
    }

    async fn update_password(&self, id: &str, password_hash: &str) -> Result<bool, StoreError> {
        self.update_identity(
            doc! { "_id": id },
            doc! { "password_hash": password_hash, "updated_utc": BsonDateTime::now() },
        )
        .await
    }

    async fn set_verification_code(
        &self,
        id: &str,
        code: &OneTimeCode,
    ) -> Result<bool, StoreError> {
        self.update_identity(
            doc! { "_id": id },
            doc! { "verification": encode(code)?, "updated_utc": BsonDateTime::now() },
        )
        .await
    }

    async fn consume_verification_code(
        &self,
        id: &str,
        code: &str,
        activate: bool,
    ) -> Result<bool, StoreError> {
        let mut set = doc! {
            "verification": null,
            "updated_utc": BsonDateTime::now(),
        };
        if activate {
            set.insert(
                "status",
                doc! {
                    "$cond": [
                        { "$eq": ["$status", IdentityStatus::Pending.as_str()] },
                        IdentityStatus::Active.as_str(),
                        "$status"
                    ]
                },
            );
        }

        // Pipeline update: only a PENDING status flips to ACTIVE.
        let result = self
            .identities()
            .update_one(
                doc! { "_id": id, "verification.code": code },
                vec![doc! { "$set": set }],
                None,
            )
            .await?;
        Ok(result.modified_count == 1)
    }

    async fn set_reset_code(&self, id: &str, code: &ResetCode) -> Result<bool, StoreError> {
        self.update_identity(
            doc! { "_id": id },
            doc! { "reset": encode(code)?, "updated_utc": BsonDateTime::now() },
        )
        .await
    }

    async fn mark_reset_code_verified(&self, id: &str, code: &str) -> Result<bool, StoreError> {
        self.update_identity(
            doc! {
                "_id": id,
                "reset.code": code,
                "reset.status": ResetStatus::Pending.as_str(),
            },
            doc! {
                "reset.status": ResetStatus::Verified.as_str(),
                "updated_utc": BsonDateTime::now(),
            },
        )
        .await
    }

    async fn replace_password_after_reset(
        &self,
        id: &str,
        password_hash: &str,
    ) -> Result<bool, StoreError> {
        self.update_identity(
            doc! { "_id": id, "reset.status": ResetStatus::Verified.as_str() },
            doc! {
                "password_hash": password_hash,
                "reset": null,
                "updated_utc": BsonDateTime::now(),
            },
        )
        .await
    }

    async fn insert_role(&self, role: &Role) -> Result<(), StoreError> {
        self.roles().insert_one(role, None).await.map_err(classify)?;
        Ok(())
    }

    async fn find_role_by_id(&self, id: &str) -> Result<Option<Role>, StoreError> {
        Ok(self.roles().find_one(doc! { "_id": id }, None).await?)
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, StoreError> {
        Ok(self.roles().find_one(doc! { "name": name }, None).await?)
    }

    async fn list_roles(&self) -> Result<Vec<Role>, StoreError> {
        let options = FindOptions::builder().sort(doc! { "name": 1 }).build();
        let cursor = self.roles().find(doc! {}, options).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn update_role(&self, role: &Role) -> Result<bool, StoreError> {
        let mut role = role.clone();
        role.updated_utc = chrono::Utc::now();
        let result = self
            .roles()
            .replace_one(doc! { "_id": role.id.as_str() }, &role, None)
            .await
            .map_err(classify)?;
        Ok(result.matched_count == 1)
    }

    async fn delete_role(&self, id: &str) -> Result<bool, StoreError> {
        let result = self.roles().delete_one(doc! { "_id": id }, None).await?;
        Ok(result.deleted_count == 1)
    }

    async fn insert_permission(&self, permission: &Permission) -> Result<(), StoreError> {
        self.permissions()
            .insert_one(permission, None)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn find_permission_by_id(&self, id: &str) -> Result<Option<Permission>, StoreError> {
        Ok(self.permissions().find_one(doc! { "_id": id }, None).await?)
    }

    async fn find_permission(
        &self,
        name: &str,
        path: &str,
        method: HttpMethod,
    ) -> Result<Option<Permission>, StoreError> {
        Ok(self
            .permissions()
            .find_one(
                doc! { "name": name, "path": path, "method": method.as_str() },
                None,
            )
            .await?)
    }

    async fn find_permissions_by_ids(
        &self,
        ids: &[String],
    ) -> Result<Vec<Permission>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let cursor = self
            .permissions()
            .find(doc! { "_id": { "$in": ids.to_vec() } }, None)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>, StoreError> {
        let options = FindOptions::builder()
            .sort(doc! { "category": 1, "path": 1 })
            .build();
        let cursor = self.permissions().find(doc! {}, options).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn update_permission(&self, permission: &Permission) -> Result<bool, StoreError> {
        let result = self
            .permissions()
            .replace_one(doc! { "_id": permission.id.as_str() }, permission, None)
            .await
            .map_err(classify)?;
        Ok(result.matched_count == 1)
    }

    async fn delete_permission(&self, id: &str) -> Result<bool, StoreError> {
        let result = self
            .permissions()
            .delete_one(doc! { "_id": id }, None)
            .await?;
        if result.deleted_count == 0 {
            return Ok(false);
        }

        self.roles()
            .update_many(
                doc! { "permission_ids": id },
                doc! { "$pull": { "permission_ids": id } },
                None,
            )
            .await?;
        Ok(true)
    }
}
