use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::users::{
    dto::{
        BulkCreateRequest, BulkFailure, BulkReport, BulkUserEntry, CreateUserRequest, Envelope,
        FindUsersQuery, UpdateUserRequest,
    },
    error::{UserError, UserResult},
    filter::UserFilter,
    password::PasswordHasher,
    repo::UserStore,
    repo_types::{NewUser, User, UserChanges},
};

/// User lifecycle operations over an injected store and hasher.
#[derive(Clone)]
pub struct UserDirectory {
    store: Arc<dyn UserStore>,
    hasher: PasswordHasher,
}

impl UserDirectory {
    pub fn new(store: Arc<dyn UserStore>, hasher: PasswordHasher) -> Self {
        Self { store, hasher }
    }

    pub async fn create_user(&self, req: CreateUserRequest) -> UserResult<Envelope<String>> {
        let name = req.name.ok_or_else(|| UserError::missing("name"))?;
        let email = req.email.ok_or_else(|| UserError::missing("email"))?;
        let password = req.password.ok_or_else(|| UserError::missing("password"))?;

        if req.password_second.as_deref() != Some(password.as_str()) {
            return Err(UserError::Validation("Passwords do not match".into()));
        }

        // The unique index on users.email backs this check up under concurrency.
        if self.store.find_by_email(&email).await?.is_some() {
            return Err(UserError::Conflict(email));
        }

        let password_hash = self.hasher.hash(&password)?;
        let user = self
            .store
            .insert(NewUser {
                name,
                email,
                password_hash,
                cellphone: req.cellphone,
                status: true,
                last_login: None,
            })
            .await?;

        info!(user_id = %user.id, email = %user.email, "user created");
        Ok(Envelope::ok(format!(
            "User created successfully with ID: {}",
            user.id
        )))
    }

    /// Absent or soft-deleted users yield a `null` message, not an error.
    pub async fn get_user_by_id(&self, id: Uuid) -> UserResult<Envelope<Option<User>>> {
        let user = self.store.find_active(id).await?;
        Ok(Envelope::ok(user))
    }

    pub async fn update_user(
        &self,
        id: Uuid,
        req: UpdateUserRequest,
    ) -> UserResult<Envelope<String>> {
        let password_hash = match req.password.as_deref() {
            Some(p) if !p.is_empty() => Some(self.hasher.hash(p)?),
            _ => None,
        };
        let changes = UserChanges {
            name: req.name,
            password_hash,
            cellphone: req.cellphone,
        };
        if changes.is_empty() {
            debug!(user_id = %id, "update with no fields");
        }

        if !self.store.update_active(id, changes).await? {
            return Err(UserError::NotFound(id));
        }

        info!(user_id = %id, "user updated");
        Ok(Envelope::ok("User updated successfully".into()))
    }

    /// Soft delete. Repeated calls are no-ops that still succeed.
    pub async fn delete_user(&self, id: Uuid) -> UserResult<Envelope<String>> {
        if self.store.deactivate(id).await? {
            info!(user_id = %id, "user soft-deleted");
        } else {
            debug!(user_id = %id, "delete matched no active user");
        }
        Ok(Envelope::ok("User deleted successfully".into()))
    }

    pub async fn get_all_users(&self) -> UserResult<Envelope<Vec<User>>> {
        let users = self.store.find_all(&UserFilter::active()).await?;
        Ok(Envelope::ok(users))
    }

    pub async fn find_users(&self, query: FindUsersQuery) -> UserResult<Envelope<Vec<User>>> {
        let filter = UserFilter::from_query(query)?;
        debug!(clauses = filter.clauses().len(), "find users");
        let users = self.store.find_all(&filter).await?;
        Ok(Envelope::ok(users))
    }

    /// Creates each entry independently and in order. Failures are recorded in
    /// the report; earlier successes are never rolled back.
    pub async fn bulk_create_users(&self, req: BulkCreateRequest) -> Envelope<BulkReport> {
        let mut report = BulkReport::default();

        for raw in req.users {
            match self.create_bulk_entry(&raw).await {
                Ok(user) => {
                    debug!(user_id = %user.id, "bulk entry created");
                    report.success += 1;
                }
                Err(e) => {
                    warn!(error = %e, "bulk entry failed");
                    report.failure += 1;
                    report.errors.push(BulkFailure {
                        user: redact(raw),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            success = report.success,
            failure = report.failure,
            "bulk create finished"
        );
        Envelope::ok(report)
    }

    async fn create_bulk_entry(&self, raw: &serde_json::Value) -> UserResult<User> {
        let entry = BulkUserEntry::deserialize(raw)
            .map_err(|e| UserError::Validation(format!("Invalid user entry: {e}")))?;
        let password = entry
            .password
            .filter(|p| !p.is_empty())
            .ok_or_else(|| UserError::missing("password"))?;
        let password_hash = self.hasher.hash(&password)?;

        self.store
            .insert(NewUser {
                name: entry.name,
                email: entry.email,
                password_hash,
                cellphone: entry.cellphone,
                status: entry.status.unwrap_or(true),
                last_login: entry.last_login,
            })
            .await
    }
}

/// Strips credentials before a submitted entry is echoed back.
fn redact(mut raw: serde_json::Value) -> serde_json::Value {
    if let Some(obj) = raw.as_object_mut() {
        obj.remove("password");
        obj.remove("password_second");
    }
    raw
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::users::repo::{FailingUserStore, InMemoryUserStore};
    use serde_json::json;

    fn directory() -> UserDirectory {
        let hasher = PasswordHasher::new(&AppConfig::in_memory().password).unwrap();
        UserDirectory::new(Arc::new(InMemoryUserStore::new()), hasher)
    }

    fn create_req(name: &str, email: &str, pw: &str, pw2: &str) -> CreateUserRequest {
        CreateUserRequest {
            name: Some(name.into()),
            email: Some(email.into()),
            password: Some(pw.into()),
            password_second: Some(pw2.into()),
            cellphone: Some("123456789".into()),
        }
    }

    fn id_from_message(msg: &str) -> Uuid {
        msg.rsplit(' ').next().unwrap().parse().unwrap()
    }

    async fn seed(dir: &UserDirectory) {
        let users = json!([
            { "name": "John Doe", "email": "john@example.com", "password": "pw", "lastLogin": "2023-07-01T00:00:00Z" },
            { "name": "Jane Doe", "email": "jane@example.com", "password": "pw", "lastLogin": "2023-06-01T00:00:00Z" },
            { "name": "Deleted User", "email": "deleted@example.com", "password": "pw", "status": false, "lastLogin": "2023-05-01T00:00:00Z" }
        ]);
        let req = BulkCreateRequest::deserialize(json!({ "users": users })).unwrap();
        let env = dir.bulk_create_users(req).await;
        assert_eq!(env.message.success, 3);
    }

    fn names(users: &[User]) -> Vec<&str> {
        users.iter().map(|u| u.name.as_str()).collect()
    }

    #[tokio::test]
    async fn create_then_get_returns_active_record() {
        let dir = directory();
        let env = dir
            .create_user(create_req("Alice", "alice@example.com", "pw1", "pw1"))
            .await
            .unwrap();
        assert_eq!(env.code, 200);
        assert!(env.message.starts_with("User created successfully with ID: "));

        let id = id_from_message(&env.message);
        let got = dir.get_user_by_id(id).await.unwrap();
        assert_eq!(got.code, 200);
        let user = got.message.expect("user should exist");
        assert_eq!(user.email, "alice@example.com");
        assert!(user.status);
        assert_ne!(user.password_hash, "pw1");
    }

    #[tokio::test]
    async fn password_mismatch_creates_nothing() {
        let dir = directory();
        let err = dir
            .create_user(create_req("Bob", "bob@example.com", "a", "b"))
            .await
            .unwrap_err();
        assert_eq!(err.status().as_u16(), 400);
        assert_eq!(err.to_string(), "Passwords do not match");
        assert!(dir.get_all_users().await.unwrap().message.is_empty());
    }

    #[tokio::test]
    async fn missing_field_is_rejected() {
        let dir = directory();
        let mut req = create_req("Bob", "bob@example.com", "a", "a");
        req.email = None;
        let err = dir.create_user(req).await.unwrap_err();
        assert_eq!(err.to_string(), "Missing required field: email");
    }

    #[tokio::test]
    async fn duplicate_email_conflicts_even_when_soft_deleted() {
        let dir = directory();
        let env = dir
            .create_user(create_req("Carol", "carol@example.com", "pw", "pw"))
            .await
            .unwrap();
        let id = id_from_message(&env.message);
        dir.delete_user(id).await.unwrap();

        let err = dir
            .create_user(create_req("Carol 2", "carol@example.com", "pw", "pw"))
            .await
            .unwrap_err();
        assert_eq!(err.status().as_u16(), 400);
        assert_eq!(err.to_string(), "User already exists");

        let all = dir.find_users(FindUsersQuery::default()).await.unwrap();
        assert_eq!(all.message.len(), 1);
    }

    #[tokio::test]
    async fn delete_hides_record_and_is_idempotent() {
        let dir = directory();
        let env = dir
            .create_user(create_req("Dan", "dan@example.com", "pw", "pw"))
            .await
            .unwrap();
        let id = id_from_message(&env.message);

        for _ in 0..2 {
            let del = dir.delete_user(id).await.unwrap();
            assert_eq!(del.code, 200);
            assert_eq!(del.message, "User deleted successfully");
        }
        assert!(dir.get_user_by_id(id).await.unwrap().message.is_none());
        assert!(dir.delete_user(Uuid::new_v4()).await.is_ok());
    }

    #[tokio::test]
    async fn update_with_no_fields_keeps_everything() {
        let dir = directory();
        let env = dir
            .create_user(create_req("Eve", "eve@example.com", "pw", "pw"))
            .await
            .unwrap();
        let id = id_from_message(&env.message);
        let before = dir.get_user_by_id(id).await.unwrap().message.unwrap();

        let upd = dir
            .update_user(id, UpdateUserRequest::default())
            .await
            .unwrap();
        assert_eq!(upd.code, 200);
        assert_eq!(upd.message, "User updated successfully");

        let after = dir.get_user_by_id(id).await.unwrap().message.unwrap();
        assert_eq!(after.name, before.name);
        assert_eq!(after.cellphone, before.cellphone);
        assert_eq!(after.password_hash, before.password_hash);
    }

    #[tokio::test]
    async fn update_rehashes_password_and_applies_partial_fields() {
        let dir = directory();
        let env = dir
            .create_user(create_req("Fay", "fay@example.com", "pw", "pw"))
            .await
            .unwrap();
        let id = id_from_message(&env.message);
        let before = dir.get_user_by_id(id).await.unwrap().message.unwrap();

        dir.update_user(
            id,
            UpdateUserRequest {
                password: Some("new-secret".into()),
                cellphone: Some("555".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let after = dir.get_user_by_id(id).await.unwrap().message.unwrap();
        assert_eq!(after.name, "Fay");
        assert_eq!(after.cellphone.as_deref(), Some("555"));
        assert_ne!(after.password_hash, before.password_hash);
        assert!(after.password_hash.starts_with("$argon2id$"));
    }

    #[tokio::test]
    async fn update_of_missing_or_deleted_user_is_not_found() {
        let dir = directory();
        let err = dir
            .update_user(Uuid::new_v4(), UpdateUserRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.status().as_u16(), 404);
    }

    #[tokio::test]
    async fn get_all_returns_only_active_and_find_without_filters_returns_all() {
        let dir = directory();
        seed(&dir).await;

        let active = dir.get_all_users().await.unwrap();
        assert_eq!(names(&active.message), ["John Doe", "Jane Doe"]);

        let all = dir.find_users(FindUsersQuery::default()).await.unwrap();
        assert_eq!(all.message.len(), 3);
    }

    #[tokio::test]
    async fn find_by_name_ignores_status() {
        let dir = directory();
        seed(&dir).await;

        let found = dir
            .find_users(FindUsersQuery {
                name: Some("John".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(names(&found.message), ["John Doe"]);

        let found = dir
            .find_users(FindUsersQuery {
                name: Some("User".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(names(&found.message), ["Deleted User"]);
    }

    #[tokio::test]
    async fn find_by_deleted_flag() {
        let dir = directory();
        seed(&dir).await;

        let deleted = dir
            .find_users(FindUsersQuery {
                deleted: Some("true".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(names(&deleted.message), ["Deleted User"]);

        let active = dir
            .find_users(FindUsersQuery {
                deleted: Some("false".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(names(&active.message), ["John Doe", "Jane Doe"]);
    }

    #[tokio::test]
    async fn find_by_last_login_bounds() {
        let dir = directory();
        seed(&dir).await;

        let before = dir
            .find_users(FindUsersQuery {
                last_login_before: Some("2023-07-01".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(names(&before.message), ["Jane Doe", "Deleted User"]);

        let after = dir
            .find_users(FindUsersQuery {
                last_login_after: Some("2023-06-01".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(names(&after.message), ["John Doe"]);

        let range = dir
            .find_users(FindUsersQuery {
                last_login_after: Some("2023-05-15".into()),
                last_login_before: Some("2023-06-15".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(names(&range.message), ["Jane Doe"]);
    }

    #[tokio::test]
    async fn bulk_create_reports_successes() {
        let dir = directory();
        let req = BulkCreateRequest::deserialize(json!({ "users": [
            { "name": "Alice", "email": "alice@example.com", "password": "password1", "password_second": "password1", "cellphone": "123456789" },
            { "name": "Bob", "email": "bob@example.com", "password": "password2", "password_second": "password2", "cellphone": "987654321" }
        ]}))
        .unwrap();

        let env = dir.bulk_create_users(req).await;
        assert_eq!(env.code, 200);
        assert_eq!(
            env.message,
            BulkReport {
                success: 2,
                failure: 0,
                errors: vec![]
            }
        );
    }

    #[tokio::test]
    async fn bulk_create_keeps_successes_around_failures() {
        let dir = directory();
        let req = BulkCreateRequest::deserialize(json!({ "users": [
            { "name": "Alice", "email": "alice@example.com", "password": "p" },
            { "name": "Alice again", "email": "alice@example.com", "password": "p" },
            { "name": "No Password", "email": "nopw@example.com" },
            { "email": "noname@example.com", "password": "p" },
            { "name": "Bob", "email": "bob@example.com", "password": "p", "password_second": "other" }
        ]}))
        .unwrap();

        let report = dir.bulk_create_users(req).await.message;
        assert_eq!(report.success, 2);
        assert_eq!(report.failure, 3);
        assert_eq!(report.errors[0].error, "User already exists");
        assert_eq!(report.errors[0].user["name"], "Alice again");
        assert!(report.errors[0].user.get("password").is_none());
        assert_eq!(report.errors[1].error, "Missing required field: password");
        assert!(report.errors[2].error.starts_with("Invalid user entry"));

        let all = dir.get_all_users().await.unwrap();
        assert_eq!(names(&all.message), ["Alice", "Bob"]);
    }

    #[tokio::test]
    async fn backend_failures_surface_as_500_with_driver_message() {
        let hasher = PasswordHasher::new(&AppConfig::in_memory().password).unwrap();
        let dir = UserDirectory::new(Arc::new(FailingUserStore), hasher);
        let driver_msg = sqlx::Error::PoolTimedOut.to_string();

        let err = dir.get_all_users().await.unwrap_err();
        assert_eq!(err.status().as_u16(), 500);
        assert_eq!(err.to_string(), driver_msg);

        let err = dir.find_users(FindUsersQuery::default()).await.unwrap_err();
        assert_eq!(err.status().as_u16(), 500);
        assert_eq!(err.to_string(), driver_msg);

        let err = dir
            .create_user(create_req("Gus", "gus@example.com", "pw", "pw"))
            .await
            .unwrap_err();
        assert_eq!(err.status().as_u16(), 500);

        let err = dir.delete_user(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.status().as_u16(), 500);

        let req = BulkCreateRequest::deserialize(json!({ "users": [
            { "name": "Hal", "email": "hal@example.com", "password": "p" }
        ]}))
        .unwrap();
        let report = dir.bulk_create_users(req).await;
        assert_eq!(report.code, 200);
        assert_eq!(report.message.failure, 1);
        assert_eq!(report.message.errors[0].error, driver_msg);
    }
}
