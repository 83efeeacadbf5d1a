use anyhow::Context;
use axum::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use super::repo_types::{NewUser, ProfileChanges, UpdatedUser, User};

const USER_COLUMNS: &str =
    "id, email, password_hash, first_name, last_name, gender, avatar_path, avatar_url, created_at";

#[derive(Debug, Error)]
pub enum UserWriteError {
    #[error("email already registered")]
    EmailTaken,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Account storage behind the identity provider.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    /// Fails with [`UserWriteError::EmailTaken`] when the address is in use.
    async fn create(&self, new: NewUser) -> Result<User, UserWriteError>;
    async fn update(
        &self,
        id: Uuid,
        changes: ProfileChanges,
    ) -> Result<Option<UpdatedUser>, UserWriteError>;
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

/// The only unique index on `users` besides the key is `email`.
fn write_error(e: sqlx::Error, what: &'static str) -> UserWriteError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => UserWriteError::EmailTaken,
        _ => UserWriteError::Other(anyhow::Error::new(e).context(what)),
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user by email")?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find user by id")?;
        Ok(user)
    }

    async fn create(&self, new: NewUser) -> Result<User, UserWriteError> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, password_hash, first_name, last_name, gender)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(new.email)
        .bind(new.password_hash)
        .bind(new.first_name)
        .bind(new.last_name)
        .bind(new.gender)
        .fetch_one(&self.db)
        .await
        .map_err(|e| write_error(e, "insert user"))
    }

    async fn update(
        &self,
        id: Uuid,
        changes: ProfileChanges,
    ) -> Result<Option<UpdatedUser>, UserWriteError> {
        let (avatar_path, avatar_url) = match changes.avatar {
            Some(img) => (Some(img.path), Some(img.url)),
            None => (None, None),
        };
        sqlx::query_as::<_, UpdatedUser>(
            r#"
            WITH prev AS (
                SELECT id, avatar_path FROM users WHERE id = $1 FOR UPDATE
            )
            UPDATE users AS u
               SET email = COALESCE($2, u.email),
                   password_hash = COALESCE($3, u.password_hash),
                   first_name = COALESCE($4, u.first_name),
                   last_name = COALESCE($5, u.last_name),
                   gender = COALESCE($6, u.gender),
                   avatar_path = COALESCE($7, u.avatar_path),
                   avatar_url = COALESCE($8, u.avatar_url)
              FROM prev
             WHERE u.id = prev.id
            RETURNING u.id, u.email, u.password_hash, u.first_name, u.last_name, u.gender,
                      u.avatar_path, u.avatar_url, u.created_at, prev.avatar_path AS previous_avatar
            "#,
        )
        .bind(id)
        .bind(changes.email)
        .bind(changes.password_hash)
        .bind(changes.first_name)
        .bind(changes.last_name)
        .bind(changes.gender)
        .bind(avatar_path)
        .bind(avatar_url)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| write_error(e, "update user"))
    }
}
