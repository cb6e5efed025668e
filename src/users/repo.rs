use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::users::{
    error::{UserError, UserResult},
    filter::UserFilter,
    repo_types::{NewUser, User, UserChanges},
};

const USER_COLUMNS: &str =
    "id, name, email, password_hash, cellphone, status, last_login, created_at, updated_at";

/// Persistence seam for the user directory.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Find an active (`status = true`) user by id.
    async fn find_active(&self, id: Uuid) -> UserResult<Option<User>>;

    /// Find a user by exact email, regardless of status.
    async fn find_by_email(&self, email: &str) -> UserResult<Option<User>>;

    async fn insert(&self, user: NewUser) -> UserResult<User>;

    /// Apply `changes` to the user only if it is still active. Returns whether a row matched.
    async fn update_active(&self, id: Uuid, changes: UserChanges) -> UserResult<bool>;

    /// Soft delete. Returns whether an active row was flipped.
    async fn deactivate(&self, id: Uuid) -> UserResult<bool>;

    async fn find_all(&self, filter: &UserFilter) -> UserResult<Vec<User>>;
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn map_insert_error(e: sqlx::Error, email: &str) -> UserError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => UserError::Conflict(email.into()),
        _ => UserError::Backend(e),
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_active(&self, id: Uuid) -> UserResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND status = TRUE"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> UserResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn insert(&self, user: NewUser) -> UserResult<User> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (name, email, password_hash, cellphone, status, last_login)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.cellphone)
        .bind(user.status)
        .bind(user.last_login)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_insert_error(e, &user.email))
    }

    async fn update_active(&self, id: Uuid, changes: UserChanges) -> UserResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
               SET name = COALESCE($2, name),
                   password_hash = COALESCE($3, password_hash),
                   cellphone = COALESCE($4, cellphone),
                   updated_at = now()
             WHERE id = $1 AND status = TRUE
            "#,
        )
        .bind(id)
        .bind(changes.name)
        .bind(changes.password_hash)
        .bind(changes.cellphone)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn deactivate(&self, id: Uuid) -> UserResult<bool> {
        let result = sqlx::query(
            "UPDATE users SET status = FALSE, updated_at = now() WHERE id = $1 AND status = TRUE",
        )
        .bind(id)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_all(&self, filter: &UserFilter) -> UserResult<Vec<User>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {USER_COLUMNS} FROM users"));
        filter.push_where(&mut qb);
        qb.push(" ORDER BY created_at, id");
        let users = qb.build_query_as::<User>().fetch_all(&self.db).await?;
        Ok(users)
    }
}

/// In-memory store keeping insertion order. Enforces email uniqueness like
/// the `users.email` constraint does.
#[derive(Debug, Default, Clone)]
pub struct InMemoryUserStore {
    users: Arc<RwLock<Vec<User>>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_active(&self, id: Uuid) -> UserResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users.iter().find(|u| u.id == id && u.status).cloned())
    }

    async fn find_by_email(&self, email: &str) -> UserResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users.iter().find(|u| u.email == email).cloned())
    }

    async fn insert(&self, user: NewUser) -> UserResult<User> {
        let mut users = self.users.write().await;
        if users.iter().any(|u| u.email == user.email) {
            return Err(UserError::Conflict(user.email));
        }

        let now = OffsetDateTime::now_utc();
        let created = User {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            cellphone: user.cellphone,
            status: user.status,
            last_login: user.last_login,
            created_at: now,
            updated_at: now,
        };
        users.push(created.clone());
        Ok(created)
    }

    async fn update_active(&self, id: Uuid, changes: UserChanges) -> UserResult<bool> {
        let mut users = self.users.write().await;
        let Some(user) = users.iter_mut().find(|u| u.id == id && u.status) else {
            return Ok(false);
        };
        changes.apply(user);
        user.updated_at = OffsetDateTime::now_utc();
        Ok(true)
    }

    async fn deactivate(&self, id: Uuid) -> UserResult<bool> {
        let mut users = self.users.write().await;
        let Some(user) = users.iter_mut().find(|u| u.id == id && u.status) else {
            return Ok(false);
        };
        user.status = false;
        user.updated_at = OffsetDateTime::now_utc();
        Ok(true)
    }

    async fn find_all(&self, filter: &UserFilter) -> UserResult<Vec<User>> {
        let users = self.users.read().await;
        Ok(users.iter().filter(|u| filter.matches(u)).cloned().collect())
    }
}

/// Store whose every call fails the way an exhausted pool does.
#[cfg(test)]
pub(crate) struct FailingUserStore;

#[cfg(test)]
#[async_trait]
impl UserStore for FailingUserStore {
    async fn find_active(&self, _id: Uuid) -> UserResult<Option<User>> {
        Err(sqlx::Error::PoolTimedOut.into())
    }

    async fn find_by_email(&self, _email: &str) -> UserResult<Option<User>> {
        Err(sqlx::Error::PoolTimedOut.into())
    }

    async fn insert(&self, _user: NewUser) -> UserResult<User> {
        Err(sqlx::Error::PoolTimedOut.into())
    }

    async fn update_active(&self, _id: Uuid, _changes: UserChanges) -> UserResult<bool> {
        Err(sqlx::Error::PoolTimedOut.into())
    }

    async fn deactivate(&self, _id: Uuid) -> UserResult<bool> {
        Err(sqlx::Error::PoolTimedOut.into())
    }

    async fn find_all(&self, _filter: &UserFilter) -> UserResult<Vec<User>> {
        Err(sqlx::Error::PoolTimedOut.into())
    }
}
