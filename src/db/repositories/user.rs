//! User repository
//!
//! Database operations for user accounts.
//!
//! This module provides:
//! - `UserRepository` trait defining the interface for user data access
//! - `SqlxUserRepository` implementing the trait for SQLite and MySQL

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::User;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

const USER_COLUMNS: &str = "id, email, password_hash, first_name, last_name, phone, timezone, \
     is_mentor, sessions_requested, last_session_requested, created_at, updated_at";

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new user
    async fn create(&self, user: &User) -> Result<User>;

    /// Get user by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Get user by email
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Persist name, phone and timezone changes
    async fn update_profile(&self, user: &User) -> Result<User>;

    /// Replace the password hash
    async fn update_password(&self, id: i64, password_hash: &str) -> Result<()>;

    /// Add `delta` to the pending-request counter (floored at zero) and,
    /// when given, record the time of the latest request
    async fn adjust_sessions_requested(
        &self,
        id: i64,
        delta: i64,
        last_requested: Option<DateTime<Utc>>,
    ) -> Result<()>;

    /// Count total users
    async fn count(&self) -> Result<i64>;
}

/// SQLx-based user repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    /// Create a new SQLx user repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_user_sqlite(self.pool.sqlite()?, user).await,
            DatabaseDriver::Mysql => create_user_mysql(self.pool.mysql()?, user).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_user_by_id_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => get_user_by_id_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_user_by_email_sqlite(self.pool.sqlite()?, email).await,
            DatabaseDriver::Mysql => get_user_by_email_mysql(self.pool.mysql()?, email).await,
        }
    }

    async fn update_profile(&self, user: &User) -> Result<User> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => update_profile_sqlite(self.pool.sqlite()?, user).await,
            DatabaseDriver::Mysql => update_profile_mysql(self.pool.mysql()?, user).await,
        }
    }

    async fn update_password(&self, id: i64, password_hash: &str) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                update_password_sqlite(self.pool.sqlite()?, id, password_hash).await
            }
            DatabaseDriver::Mysql => {
                update_password_mysql(self.pool.mysql()?, id, password_hash).await
            }
        }
    }

    async fn adjust_sessions_requested(
        &self,
        id: i64,
        delta: i64,
        last_requested: Option<DateTime<Utc>>,
    ) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                adjust_requested_sqlite(self.pool.sqlite()?, id, delta, last_requested).await
            }
            DatabaseDriver::Mysql => {
                adjust_requested_mysql(self.pool.mysql()?, id, delta, last_requested).await
            }
        }
    }

    async fn count(&self) -> Result<i64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => count_users_sqlite(self.pool.sqlite()?).await,
            DatabaseDriver::Mysql => count_users_mysql(self.pool.mysql()?).await,
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_user_sqlite(pool: &SqlitePool, user: &User) -> Result<User> {
    let result = sqlx::query(
        r#"
        INSERT INTO users (email, password_hash, first_name, last_name, phone, timezone,
                           is_mentor, sessions_requested, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
        "#,
    )
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(&user.phone)
    .bind(&user.timezone)
    .bind(user.is_mentor)
    .bind(user.created_at)
    .bind(user.updated_at)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    let id = result.last_insert_rowid();
    get_user_by_id_sqlite(pool, id)
        .await?
        .context("Failed to fetch created user")
}

async fn get_user_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<User>> {
    let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by ID")?;

    row.as_ref().map(row_to_user_sqlite).transpose()
}

async fn get_user_by_email_sqlite(pool: &SqlitePool, email: &str) -> Result<Option<User>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM users WHERE LOWER(email) = LOWER(?)",
        USER_COLUMNS
    ))
    .bind(email)
    .fetch_optional(pool)
    .await
    .context("Failed to get user by email")?;

    row.as_ref().map(row_to_user_sqlite).transpose()
}

async fn update_profile_sqlite(pool: &SqlitePool, user: &User) -> Result<User> {
    let now = Utc::now();
    sqlx::query(
        r#"
        UPDATE users
        SET first_name = ?, last_name = ?, phone = ?, timezone = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(&user.phone)
    .bind(&user.timezone)
    .bind(now)
    .bind(user.id)
    .execute(pool)
    .await
    .context("Failed to update user profile")?;

    get_user_by_id_sqlite(pool, user.id)
        .await?
        .context("User not found after update")
}

async fn update_password_sqlite(pool: &SqlitePool, id: i64, password_hash: &str) -> Result<()> {
    sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
        .bind(password_hash)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to update password")?;
    Ok(())
}

async fn adjust_requested_sqlite(
    pool: &SqlitePool,
    id: i64,
    delta: i64,
    last_requested: Option<DateTime<Utc>>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE users
        SET sessions_requested = MAX(sessions_requested + ?, 0),
            last_session_requested = COALESCE(?, last_session_requested),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(delta)
    .bind(last_requested)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to adjust requested session count")?;
    Ok(())
}

async fn count_users_sqlite(pool: &SqlitePool) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) as count FROM users")
        .fetch_one(pool)
        .await
        .context("Failed to count users")?;
    Ok(row.get("count"))
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        phone: row.try_get("phone")?,
        timezone: row.try_get("timezone")?,
        is_mentor: row.try_get("is_mentor")?,
        sessions_requested: row.try_get("sessions_requested")?,
        last_session_requested: row.try_get("last_session_requested")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_user_mysql(pool: &MySqlPool, user: &User) -> Result<User> {
    let result = sqlx::query(
        r#"
        INSERT INTO users (email, password_hash, first_name, last_name, phone, timezone,
                           is_mentor, sessions_requested, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
        "#,
    )
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(&user.phone)
    .bind(&user.timezone)
    .bind(user.is_mentor)
    .bind(user.created_at)
    .bind(user.updated_at)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    let id = result.last_insert_id() as i64;
    get_user_by_id_mysql(pool, id)
        .await?
        .context("Failed to fetch created user")
}

async fn get_user_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<User>> {
    let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by ID")?;

    row.as_ref().map(row_to_user_mysql).transpose()
}

async fn get_user_by_email_mysql(pool: &MySqlPool, email: &str) -> Result<Option<User>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM users WHERE LOWER(email) = LOWER(?)",
        USER_COLUMNS
    ))
    .bind(email)
    .fetch_optional(pool)
    .await
    .context("Failed to get user by email")?;

    row.as_ref().map(row_to_user_mysql).transpose()
}

async fn update_profile_mysql(pool: &MySqlPool, user: &User) -> Result<User> {
    let now = Utc::now();
    sqlx::query(
        r#"
        UPDATE users
        SET first_name = ?, last_name = ?, phone = ?, timezone = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(&user.phone)
    .bind(&user.timezone)
    .bind(now)
    .bind(user.id)
    .execute(pool)
    .await
    .context("Failed to update user profile")?;

    get_user_by_id_mysql(pool, user.id)
        .await?
        .context("User not found after update")
}

async fn update_password_mysql(pool: &MySqlPool, id: i64, password_hash: &str) -> Result<()> {
    sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
        .bind(password_hash)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to update password")?;
    Ok(())
}

async fn adjust_requested_mysql(
    pool: &MySqlPool,
    id: i64,
    delta: i64,
    last_requested: Option<DateTime<Utc>>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE users
        SET sessions_requested = GREATEST(sessions_requested + ?, 0),
            last_session_requested = COALESCE(?, last_session_requested),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(delta)
    .bind(last_requested)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to adjust requested session count")?;
    Ok(())
}

async fn count_users_mysql(pool: &MySqlPool) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) as count FROM users")
        .fetch_one(pool)
        .await
        .context("Failed to count users")?;
    Ok(row.get("count"))
}

fn row_to_user_mysql(row: &sqlx::mysql::MySqlRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        phone: row.try_get("phone")?,
        timezone: row.try_get("timezone")?,
        is_mentor: row.try_get("is_mentor")?,
        sessions_requested: row.try_get("sessions_requested")?,
        last_session_requested: row.try_get("last_session_requested")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> SqlxUserRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxUserRepository::new(pool)
    }

    fn test_user(email: &str) -> User {
        User::new(email.into(), "hash".into(), "Test".into(), "User".into(), false)
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let repo = setup_test_repo().await;
        let created = repo.create(&test_user("a@example.com")).await.unwrap();
        assert!(created.id > 0);

        let fetched = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.email, "a@example.com");
        assert_eq!(fetched.timezone, "UTC");
        assert_eq!(fetched.sessions_requested, 0);

        let by_email = repo.get_by_email("A@Example.com").await.unwrap();
        assert_eq!(by_email.map(|u| u.id), Some(created.id));
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let repo = setup_test_repo().await;
        repo.create(&test_user("dup@example.com")).await.unwrap();
        assert!(repo.create(&test_user("dup@example.com")).await.is_err());
    }

    #[tokio::test]
    async fn test_update_profile() {
        let repo = setup_test_repo().await;
        let mut user = repo.create(&test_user("p@example.com")).await.unwrap();
        user.timezone = "Europe/Berlin".into();
        user.phone = Some("+4912345".into());
        let updated = repo.update_profile(&user).await.unwrap();
        assert_eq!(updated.timezone, "Europe/Berlin");
        assert_eq!(updated.phone.as_deref(), Some("+4912345"));
    }

    #[tokio::test]
    async fn test_adjust_sessions_requested_floors_at_zero() {
        let repo = setup_test_repo().await;
        let user = repo.create(&test_user("c@example.com")).await.unwrap();
        let when = Utc::now();

        repo.adjust_sessions_requested(user.id, 1, Some(when)).await.unwrap();
        repo.adjust_sessions_requested(user.id, 1, None).await.unwrap();
        let fetched = repo.get_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(fetched.sessions_requested, 2);
        assert!(fetched.last_session_requested.is_some());

        repo.adjust_sessions_requested(user.id, -5, None).await.unwrap();
        let fetched = repo.get_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(fetched.sessions_requested, 0);
        assert!(fetched.last_session_requested.is_some());
    }
}
