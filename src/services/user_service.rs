use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{info, warn};

use super::{ServiceError, ServiceResult};
use crate::api::format::document_to_api_value;
use crate::auth::{hash_password, verify_password};
use crate::database::document::{normalize_id, timestamp_now};
use crate::database::{Document, DocumentStore, ObjectId, ID_FIELD};
use crate::schema::{ValidationErrors, USER_SCHEMA};

const COLLECTION: &str = "user";

/// Keys `update_profile` never writes
const PROFILE_PROTECTED: &[&str] = &[ID_FIELD, "id", "password", "createdAt", "updatedAt", "addedBy", "role"];

/// The caller's own account: lookup, password and profile changes
pub struct UserService {
    store: Arc<dyn DocumentStore>,
}

/// Input for creating an account out of band (CLI, fixtures)
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: String,
    pub name: Option<String>,
}

impl UserService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    fn self_query(user_id: &str) -> Value {
        json!({ ID_FIELD: normalize_id(user_id), "isDeleted": false, "isActive": true })
    }

    /// Raw active user document, password included
    pub async fn find_active(&self, user_id: &str) -> ServiceResult<Option<Document>> {
        if !ObjectId::is_valid(user_id) {
            return Ok(None);
        }
        Ok(self.store.find_one(COLLECTION, &Self::self_query(user_id)).await?)
    }

    pub async fn me(&self, user_id: &str) -> ServiceResult<Value> {
        self.find_active(user_id)
            .await?
            .map(|doc| Value::Object(document_to_api_value(doc)))
            .ok_or(ServiceError::NotFound)
    }

    pub async fn change_password(&self, user_id: &str, body: &Value) -> ServiceResult<()> {
        let field = |key: &str| body.get(key).and_then(Value::as_str).filter(|s| !s.is_empty());
        let (old_password, new_password) = match (field("oldPassword"), field("newPassword")) {
            (Some(old), Some(new)) => (old, new),
            _ => {
                return Err(ServiceError::Validation(ValidationErrors::single(
                    "password",
                    "Please Provide userId, new Password and Old password",
                )))
            }
        };

        let user = self.find_active(user_id).await?.ok_or(ServiceError::NotFound)?;
        let stored = user.get("password").and_then(Value::as_str).unwrap_or_default();
        if !verify_password(old_password, stored) {
            warn!("Password change rejected for {}: old password mismatch", user_id);
            return Err(ServiceError::Failure("Incorrect Old Password".to_string()));
        }

        let hash = hash_password(new_password).map_err(|e| ServiceError::Failure(e.to_string()))?;
        let mut set = Document::new();
        set.insert("password".to_string(), Value::String(hash));
        set.insert("updatedAt".to_string(), timestamp_now());
        self.store
            .update_one(COLLECTION, &json!({ ID_FIELD: normalize_id(user_id) }), &set)
            .await?
            .ok_or(ServiceError::NotFound)?;
        info!("Password changed for user {}", user_id);
        Ok(())
    }

    pub async fn update_profile(&self, user_id: &str, payload: &Value) -> ServiceResult<Value> {
        let mut set = USER_SCHEMA.validate_update(payload).map_err(ServiceError::InvalidParameters)?;
        for key in PROFILE_PROTECTED {
            set.remove(*key);
        }
        set.insert("updatedBy".to_string(), Value::String(normalize_id(user_id)));
        set.insert("updatedAt".to_string(), timestamp_now());

        self.store
            .update_one(COLLECTION, &Self::self_query(user_id), &set)
            .await?
            .map(|doc| Value::Object(document_to_api_value(doc)))
            .ok_or(ServiceError::NotFound)
    }

    /// Hashes the password and stores an active account
    pub async fn create_user(&self, user: NewUser) -> ServiceResult<Value> {
        let hash = hash_password(&user.password).map_err(|e| ServiceError::Failure(e.to_string()))?;
        let now = timestamp_now();
        let mut doc = Document::new();
        doc.insert(ID_FIELD.to_string(), Value::String(ObjectId::new().to_hex()));
        doc.insert("username".to_string(), Value::String(user.username));
        doc.insert("email".to_string(), Value::String(user.email));
        doc.insert("name".to_string(), user.name.map(Value::String).unwrap_or(Value::Null));
        doc.insert("password".to_string(), Value::String(hash));
        doc.insert("role".to_string(), Value::String(user.role));
        doc.insert("isActive".to_string(), Value::Bool(true));
        doc.insert("isDeleted".to_string(), Value::Bool(false));
        doc.insert("createdAt".to_string(), now.clone());
        doc.insert("updatedAt".to_string(), now);

        let created = self.store.insert_one(COLLECTION, doc).await?;
        Ok(Value::Object(document_to_api_value(created)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{DatabaseError, MemoryStore};

    fn new_user(username: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: format!("{}@example.com", username),
            password: "initial-pass".to_string(),
            role: "user".to_string(),
            name: None,
        }
    }

    async fn seeded() -> (UserService, String) {
        let service = UserService::new(Arc::new(MemoryStore::new()));
        let created = service.create_user(new_user("alice")).await.unwrap();
        let id = created["id"].as_str().unwrap().to_string();
        (service, id)
    }

    #[tokio::test]
    async fn me_hides_password() {
        let (service, id) = seeded().await;
        let me = service.me(&id).await.unwrap();
        assert_eq!(me["username"], json!("alice"));
        assert!(me.get("password").is_none());
        assert!(matches!(service.me("65a1b2c3d4e5f60718293a4b").await, Err(ServiceError::NotFound)));
    }

    #[tokio::test]
    async fn change_password_checks_old_one() {
        let (service, id) = seeded().await;
        let err = service.change_password(&id, &json!({ "oldPassword": "initial-pass" })).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let err = service
            .change_password(&id, &json!({ "oldPassword": "wrong", "newPassword": "next-pass" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Failure(_)));

        service
            .change_password(&id, &json!({ "oldPassword": "initial-pass", "newPassword": "next-pass" }))
            .await
            .unwrap();
        let stored = service.find_active(&id).await.unwrap().unwrap();
        assert!(verify_password("next-pass", stored["password"].as_str().unwrap()));
    }

    #[tokio::test]
    async fn update_profile_strips_protected_keys() {
        let (service, id) = seeded().await;
        let updated = service
            .update_profile(&id, &json!({ "name": "Alice", "password": "plain", "createdAt": "2000-01-01" }))
            .await
            .unwrap();
        assert_eq!(updated["name"], json!("Alice"));
        assert!(updated.get("password").is_none());
        assert_ne!(updated["createdAt"], json!("2000-01-01"));

        let stored = service.find_active(&id).await.unwrap().unwrap();
        assert!(verify_password("initial-pass", stored["password"].as_str().unwrap()));
    }

    #[tokio::test]
    async fn update_profile_reports_duplicates() {
        let (service, id) = seeded().await;
        service.create_user(new_user("bob")).await.unwrap();
        let err = service.update_profile(&id, &json!({ "email": "bob@example.com" })).await.unwrap_err();
        assert!(matches!(err, ServiceError::Database(DatabaseError::DuplicateKey { .. })));
    }
}
