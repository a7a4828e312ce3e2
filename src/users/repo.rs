use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::users::repo_types::{NewUser, User, UserChanges};

#[derive(Debug, Error)]
pub enum CreateUserError {
    #[error("email already registered")]
    DuplicateEmail,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// SQLSTATE 23505.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

/// Persistence for user accounts.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `DuplicateEmail` when the address is taken, including by a concurrent insert.
    async fn create(&self, new_user: NewUser) -> Result<User, CreateUserError>;
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    async fn find_by_token(&self, token: &str) -> anyhow::Result<Option<User>>;
    /// All users, oldest first.
    async fn list(&self) -> anyhow::Result<Vec<User>>;
    async fn set_active(&self, id: Uuid, active: bool) -> anyhow::Result<()>;
    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> anyhow::Result<()>;
    /// Returns `None` when no user has this id.
    async fn update(&self, id: Uuid, changes: &UserChanges) -> anyhow::Result<Option<User>>;
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

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, new_user: NewUser) -> Result<User, CreateUserError> {
        let inserted = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, password_hash, is_active, token,
                               first_name, last_name, phone, country)
            VALUES ($1, $2, FALSE, $3, $4, $5, $6, $7)
            RETURNING id, email, password_hash, is_active, is_staff, token,
                      first_name, last_name, phone, country, created_at
            "#,
        )
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .bind(&new_user.token)
        .bind(&new_user.profile.first_name)
        .bind(&new_user.profile.last_name)
        .bind(&new_user.profile.phone)
        .bind(&new_user.profile.country)
        .fetch_one(&self.db)
        .await;

        match inserted {
            Ok(user) => Ok(user),
            Err(e) if is_unique_violation(&e) => Err(CreateUserError::DuplicateEmail),
            Err(e) => Err(anyhow::Error::new(e).context("insert user").into()),
        }
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, is_active, is_staff, token,
                   first_name, last_name, phone, country, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find user by id")?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, is_active, is_staff, token,
                   first_name, last_name, phone, country, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user by email")?;
        Ok(user)
    }

    async fn find_by_token(&self, token: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, is_active, is_staff, token,
                   first_name, last_name, phone, country, created_at
            FROM users
            WHERE token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.db)
        .await
        .context("find user by token")?;
        Ok(user)
    }

    async fn list(&self) -> anyhow::Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, is_active, is_staff, token,
                   first_name, last_name, phone, country, created_at
            FROM users
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.db)
        .await
        .context("list users")?;
        Ok(users)
    }

    async fn set_active(&self, id: Uuid, active: bool) -> anyhow::Result<()> {
        sqlx::query(r#"UPDATE users SET is_active = $2 WHERE id = $1"#)
            .bind(id)
            .bind(active)
            .execute(&self.db)
            .await
            .context("set user active")?;
        Ok(())
    }

    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> anyhow::Result<()> {
        sqlx::query(r#"UPDATE users SET password_hash = $2 WHERE id = $1"#)
            .bind(id)
            .bind(password_hash)
            .execute(&self.db)
            .await
            .context("set user password")?;
        Ok(())
    }

    async fn update(&self, id: Uuid, changes: &UserChanges) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
               SET first_name = COALESCE($2, first_name),
                   last_name  = COALESCE($3, last_name),
                   phone      = COALESCE($4, phone),
                   country    = COALESCE($5, country),
                   is_active  = COALESCE($6, is_active)
             WHERE id = $1
            RETURNING id, email, password_hash, is_active, is_staff, token,
                      first_name, last_name, phone, country, created_at
            "#,
        )
        .bind(id)
        .bind(&changes.profile.first_name)
        .bind(&changes.profile.last_name)
        .bind(&changes.profile.phone)
        .bind(&changes.profile.country)
        .bind(changes.is_active)
        .fetch_optional(&self.db)
        .await
        .context("update user")?;
        Ok(user)
    }
}
