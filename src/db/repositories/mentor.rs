//! Mentor repository
//!
//! Mentor profiles, their counters and their weekly slots. A mentor row
//! always belongs to an existing user; `get` joins the two.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Mentor, Slot};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

const MENTOR_SELECT: &str = r#"
    SELECT u.id, u.email, u.first_name, u.last_name, u.phone, u.timezone,
           m.is_mentoring, m.session_requests, m.active_sessions, m.last_session_request
    FROM mentors m
    JOIN users u ON u.id = m.user_id
    WHERE m.user_id = ?
"#;

const SLOT_SELECT: &str = r#"
    SELECT day_of_week, hour, minute
    FROM mentor_slots
    WHERE mentor_id = ?
    ORDER BY day_of_week, hour, minute
"#;

/// Mentor repository trait
#[async_trait]
pub trait MentorRepository: Send + Sync {
    /// Create an empty, non-mentoring profile for an existing user
    async fn create_profile(&self, user_id: i64) -> Result<()>;

    /// Get a mentor with identity fields and slots
    async fn get(&self, user_id: i64) -> Result<Option<Mentor>>;

    /// Toggle whether the mentor accepts requests
    async fn set_mentoring(&self, user_id: i64, is_mentoring: bool) -> Result<()>;

    /// Replace the full set of weekly slots
    async fn replace_slots(&self, user_id: i64, slots: &[Slot]) -> Result<()>;

    /// Apply deltas to the request and active-session counters, each floored
    /// at zero, and record the latest request time when given
    async fn adjust_counters(
        &self,
        user_id: i64,
        session_requests: i64,
        active_sessions: i64,
        last_request: Option<DateTime<Utc>>,
    ) -> Result<()>;
}

/// SQLx-based mentor repository implementation
pub struct SqlxMentorRepository {
    pool: DynDatabasePool,
}

impl SqlxMentorRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn MentorRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl MentorRepository for SqlxMentorRepository {
    async fn create_profile(&self, user_id: i64) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_profile_sqlite(self.pool.sqlite()?, user_id).await,
            DatabaseDriver::Mysql => create_profile_mysql(self.pool.mysql()?, user_id).await,
        }
    }

    async fn get(&self, user_id: i64) -> Result<Option<Mentor>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_mentor_sqlite(self.pool.sqlite()?, user_id).await,
            DatabaseDriver::Mysql => get_mentor_mysql(self.pool.mysql()?, user_id).await,
        }
    }

    async fn set_mentoring(&self, user_id: i64, is_mentoring: bool) -> Result<()> {
        let query = "UPDATE mentors SET is_mentoring = ? WHERE user_id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(query)
                    .bind(is_mentoring)
                    .bind(user_id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to update mentoring flag")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(query)
                    .bind(is_mentoring)
                    .bind(user_id)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to update mentoring flag")?;
            }
        }
        Ok(())
    }

    async fn replace_slots(&self, user_id: i64, slots: &[Slot]) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                replace_slots_sqlite(self.pool.sqlite()?, user_id, slots).await
            }
            DatabaseDriver::Mysql => replace_slots_mysql(self.pool.mysql()?, user_id, slots).await,
        }
    }

    async fn adjust_counters(
        &self,
        user_id: i64,
        session_requests: i64,
        active_sessions: i64,
        last_request: Option<DateTime<Utc>>,
    ) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(
                    r#"
                    UPDATE mentors
                    SET session_requests = MAX(session_requests + ?, 0),
                        active_sessions = MAX(active_sessions + ?, 0),
                        last_session_request = COALESCE(?, last_session_request)
                    WHERE user_id = ?
                    "#,
                )
                .bind(session_requests)
                .bind(active_sessions)
                .bind(last_request)
                .bind(user_id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to adjust mentor counters")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(
                    r#"
                    UPDATE mentors
                    SET session_requests = GREATEST(session_requests + ?, 0),
                        active_sessions = GREATEST(active_sessions + ?, 0),
                        last_session_request = COALESCE(?, last_session_request)
                    WHERE user_id = ?
                    "#,
                )
                .bind(session_requests)
                .bind(active_sessions)
                .bind(last_request)
                .bind(user_id)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to adjust mentor counters")?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_profile_sqlite(pool: &SqlitePool, user_id: i64) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO mentors (user_id) VALUES (?)")
        .bind(user_id)
        .execute(pool)
        .await
        .context("Failed to create mentor profile")?;
    Ok(())
}

async fn get_mentor_sqlite(pool: &SqlitePool, user_id: i64) -> Result<Option<Mentor>> {
    let row = sqlx::query(MENTOR_SELECT)
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .context("Failed to get mentor")?;

    let Some(row) = row else {
        return Ok(None);
    };

    let slot_rows = sqlx::query(SLOT_SELECT)
        .bind(user_id)
        .fetch_all(pool)
        .await
        .context("Failed to get mentor slots")?;

    let mut slots = Vec::with_capacity(slot_rows.len());
    for slot_row in &slot_rows {
        let day: i32 = slot_row.try_get("day_of_week")?;
        let hour: i32 = slot_row.try_get("hour")?;
        let minute: i32 = slot_row.try_get("minute")?;
        match Slot::from_columns(day, hour, minute) {
            Some(slot) => slots.push(slot),
            None => tracing::warn!(mentor_id = user_id, day, hour, minute, "Skipping malformed slot"),
        }
    }

    Ok(Some(Mentor {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        phone: row.try_get("phone")?,
        timezone: row.try_get("timezone")?,
        is_mentoring: row.try_get("is_mentoring")?,
        session_requests: row.try_get("session_requests")?,
        active_sessions: row.try_get("active_sessions")?,
        last_session_request: row.try_get("last_session_request")?,
        slots,
    }))
}

async fn replace_slots_sqlite(pool: &SqlitePool, user_id: i64, slots: &[Slot]) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query("DELETE FROM mentor_slots WHERE mentor_id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .context("Failed to clear mentor slots")?;

    for slot in slots {
        sqlx::query(
            "INSERT INTO mentor_slots (mentor_id, day_of_week, hour, minute) VALUES (?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(slot.day_index())
        .bind(slot.hour as i32)
        .bind(slot.minute as i32)
        .execute(&mut *tx)
        .await
        .context("Failed to insert mentor slot")?;
    }

    tx.commit().await.context("Failed to commit slots")?;
    Ok(())
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_profile_mysql(pool: &MySqlPool, user_id: i64) -> Result<()> {
    sqlx::query("INSERT IGNORE INTO mentors (user_id) VALUES (?)")
        .bind(user_id)
        .execute(pool)
        .await
        .context("Failed to create mentor profile")?;
    Ok(())
}

async fn get_mentor_mysql(pool: &MySqlPool, user_id: i64) -> Result<Option<Mentor>> {
    let row = sqlx::query(MENTOR_SELECT)
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .context("Failed to get mentor")?;

    let Some(row) = row else {
        return Ok(None);
    };

    let slot_rows = sqlx::query(SLOT_SELECT)
        .bind(user_id)
        .fetch_all(pool)
        .await
        .context("Failed to get mentor slots")?;

    let mut slots = Vec::with_capacity(slot_rows.len());
    for slot_row in &slot_rows {
        let day: i32 = slot_row.try_get("day_of_week")?;
        let hour: i32 = slot_row.try_get("hour")?;
        let minute: i32 = slot_row.try_get("minute")?;
        match Slot::from_columns(day, hour, minute) {
            Some(slot) => slots.push(slot),
            None => tracing::warn!(mentor_id = user_id, day, hour, minute, "Skipping malformed slot"),
        }
    }

    Ok(Some(Mentor {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        phone: row.try_get("phone")?,
        timezone: row.try_get("timezone")?,
        is_mentoring: row.try_get("is_mentoring")?,
        session_requests: row.try_get("session_requests")?,
        active_sessions: row.try_get("active_sessions")?,
        last_session_request: row.try_get("last_session_request")?,
        slots,
    }))
}

async fn replace_slots_mysql(pool: &MySqlPool, user_id: i64, slots: &[Slot]) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query("DELETE FROM mentor_slots WHERE mentor_id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .context("Failed to clear mentor slots")?;

    for slot in slots {
        sqlx::query(
            "INSERT INTO mentor_slots (mentor_id, day_of_week, hour, minute) VALUES (?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(slot.day_index())
        .bind(slot.hour as i32)
        .bind(slot.minute as i32)
        .execute(&mut *tx)
        .await
        .context("Failed to insert mentor slot")?;
    }

    tx.commit().await.context("Failed to commit slots")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::User;
    use chrono::Weekday;

    async fn setup() -> (SqlxMentorRepository, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let user = SqlxUserRepository::new(pool.clone())
            .create(&User::new(
                "mentor@example.com".into(),
                "hash".into(),
                "Mia".into(),
                "Mentor".into(),
                true,
            ))
            .await
            .unwrap();
        let repo = SqlxMentorRepository::new(pool);
        repo.create_profile(user.id).await.unwrap();
        (repo, user.id)
    }

    #[tokio::test]
    async fn test_new_profile_defaults() {
        let (repo, id) = setup().await;
        let mentor = repo.get(id).await.unwrap().expect("mentor exists");
        assert_eq!(mentor.first_name, "Mia");
        assert!(!mentor.is_mentoring);
        assert_eq!(mentor.session_requests, 0);
        assert_eq!(mentor.active_sessions, 0);
        assert!(mentor.slots.is_empty());
    }

    #[tokio::test]
    async fn test_get_missing_mentor() {
        let (repo, id) = setup().await;
        assert!(repo.get(id + 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_profile_is_idempotent() {
        let (repo, id) = setup().await;
        repo.set_mentoring(id, true).await.unwrap();
        repo.create_profile(id).await.unwrap();
        assert!(repo.get(id).await.unwrap().unwrap().is_mentoring);
    }

    #[tokio::test]
    async fn test_replace_slots() {
        let (repo, id) = setup().await;
        let first = vec![
            Slot::new(Weekday::Mon, 14, 0).unwrap(),
            Slot::new(Weekday::Sun, 9, 30).unwrap(),
        ];
        repo.replace_slots(id, &first).await.unwrap();
        let slots = repo.get(id).await.unwrap().unwrap().slots;
        // Ordered by day index, Sunday first
        assert_eq!(slots, vec![first[1], first[0]]);

        let second = vec![Slot::new(Weekday::Fri, 18, 15).unwrap()];
        repo.replace_slots(id, &second).await.unwrap();
        assert_eq!(repo.get(id).await.unwrap().unwrap().slots, second);

        repo.replace_slots(id, &[]).await.unwrap();
        assert!(repo.get(id).await.unwrap().unwrap().slots.is_empty());
    }

    #[tokio::test]
    async fn test_adjust_counters_floor_at_zero() {
        let (repo, id) = setup().await;
        let when = Utc::now();

        repo.adjust_counters(id, 2, 0, Some(when)).await.unwrap();
        repo.adjust_counters(id, -1, 1, None).await.unwrap();
        let mentor = repo.get(id).await.unwrap().unwrap();
        assert_eq!(mentor.session_requests, 1);
        assert_eq!(mentor.active_sessions, 1);
        assert!(mentor.last_session_request.is_some());

        repo.adjust_counters(id, -3, -3, None).await.unwrap();
        let mentor = repo.get(id).await.unwrap().unwrap();
        assert_eq!(mentor.session_requests, 0);
        assert_eq!(mentor.active_sessions, 0);
    }
}
