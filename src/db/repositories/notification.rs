//! Notification repository
//!
//! In-app notifications are only ever read or updated through their
//! recipient, so every lookup is scoped by user id.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::Notification;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Notification repository trait
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Persist a notification
    async fn create(&self, notification: &Notification) -> Result<Notification>;

    /// Newest first; `unread_only` drops read notifications
    async fn list_for_user(&self, user_id: i64, unread_only: bool) -> Result<Vec<Notification>>;

    /// Mark one notification read. Returns false when it does not exist or
    /// belongs to someone else.
    async fn mark_read(&self, user_id: i64, id: i64) -> Result<bool>;

    /// Mark all of a user's notifications read; returns how many changed
    async fn mark_all_read(&self, user_id: i64) -> Result<u64>;
}

/// SQLx-based notification repository implementation
pub struct SqlxNotificationRepository {
    pool: DynDatabasePool,
}

impl SqlxNotificationRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn NotificationRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl NotificationRepository for SqlxNotificationRepository {
    async fn create(&self, notification: &Notification) -> Result<Notification> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                create_notification_sqlite(self.pool.sqlite()?, notification).await
            }
            DatabaseDriver::Mysql => {
                create_notification_mysql(self.pool.mysql()?, notification).await
            }
        }
    }

    async fn list_for_user(&self, user_id: i64, unread_only: bool) -> Result<Vec<Notification>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                list_notifications_sqlite(self.pool.sqlite()?, user_id, unread_only).await
            }
            DatabaseDriver::Mysql => {
                list_notifications_mysql(self.pool.mysql()?, user_id, unread_only).await
            }
        }
    }

    async fn mark_read(&self, user_id: i64, id: i64) -> Result<bool> {
        let query = "UPDATE notifications SET is_read = ? WHERE id = ? AND user_id = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                // SQLite counts matched rows, so an already-read row still reports 1
                sqlx::query(query)
                    .bind(true)
                    .bind(id)
                    .bind(user_id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to mark notification read")?
                    .rows_affected()
            }
            DatabaseDriver::Mysql => {
                // MySQL reports changed rows; check ownership separately
                let pool = self.pool.mysql()?;
                let exists = sqlx::query("SELECT id FROM notifications WHERE id = ? AND user_id = ?")
                    .bind(id)
                    .bind(user_id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to look up notification")?
                    .is_some();
                if !exists {
                    return Ok(false);
                }
                sqlx::query(query)
                    .bind(true)
                    .bind(id)
                    .bind(user_id)
                    .execute(pool)
                    .await
                    .context("Failed to mark notification read")?;
                1
            }
        };
        Ok(affected > 0)
    }

    async fn mark_all_read(&self, user_id: i64) -> Result<u64> {
        let query = "UPDATE notifications SET is_read = ? WHERE user_id = ? AND is_read = ?";
        let result = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(query)
                .bind(true)
                .bind(user_id)
                .bind(false)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to mark notifications read")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(query)
                .bind(true)
                .bind(user_id)
                .bind(false)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to mark notifications read")?
                .rows_affected(),
        };
        Ok(result)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_notification_sqlite(
    pool: &SqlitePool,
    notification: &Notification,
) -> Result<Notification> {
    let result = sqlx::query(
        r#"
        INSERT INTO notifications (user_id, title, body, link, is_read, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(notification.user_id)
    .bind(&notification.title)
    .bind(&notification.body)
    .bind(&notification.link)
    .bind(notification.is_read)
    .bind(notification.created_at)
    .execute(pool)
    .await
    .context("Failed to create notification")?;

    Ok(Notification {
        id: result.last_insert_rowid(),
        ..notification.clone()
    })
}

async fn list_notifications_sqlite(
    pool: &SqlitePool,
    user_id: i64,
    unread_only: bool,
) -> Result<Vec<Notification>> {
    let sql = if unread_only {
        "SELECT id, user_id, title, body, link, is_read, created_at FROM notifications \
         WHERE user_id = ? AND is_read = 0 ORDER BY created_at DESC, id DESC"
    } else {
        "SELECT id, user_id, title, body, link, is_read, created_at FROM notifications \
         WHERE user_id = ? ORDER BY created_at DESC, id DESC"
    };
    let rows = sqlx::query(sql)
        .bind(user_id)
        .fetch_all(pool)
        .await
        .context("Failed to list notifications")?;

    rows.iter()
        .map(|row| {
            Ok(Notification {
                id: row.try_get("id")?,
                user_id: row.try_get("user_id")?,
                title: row.try_get("title")?,
                body: row.try_get("body")?,
                link: row.try_get("link")?,
                is_read: row.try_get("is_read")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .collect()
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_notification_mysql(
    pool: &MySqlPool,
    notification: &Notification,
) -> Result<Notification> {
    let result = sqlx::query(
        r#"
        INSERT INTO notifications (user_id, title, body, link, is_read, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(notification.user_id)
    .bind(&notification.title)
    .bind(&notification.body)
    .bind(&notification.link)
    .bind(notification.is_read)
    .bind(notification.created_at)
    .execute(pool)
    .await
    .context("Failed to create notification")?;

    Ok(Notification {
        id: result.last_insert_id() as i64,
        ..notification.clone()
    })
}

async fn list_notifications_mysql(
    pool: &MySqlPool,
    user_id: i64,
    unread_only: bool,
) -> Result<Vec<Notification>> {
    let sql = if unread_only {
        "SELECT id, user_id, title, body, link, is_read, created_at FROM notifications \
         WHERE user_id = ? AND is_read = FALSE ORDER BY created_at DESC, id DESC"
    } else {
        "SELECT id, user_id, title, body, link, is_read, created_at FROM notifications \
         WHERE user_id = ? ORDER BY created_at DESC, id DESC"
    };
    let rows = sqlx::query(sql)
        .bind(user_id)
        .fetch_all(pool)
        .await
        .context("Failed to list notifications")?;

    rows.iter()
        .map(|row| {
            Ok(Notification {
                id: row.try_get("id")?,
                user_id: row.try_get("user_id")?,
                title: row.try_get("title")?,
                body: row.try_get("body")?,
                link: row.try_get("link")?,
                is_read: row.try_get("is_read")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::User;

    async fn setup() -> (SqlxNotificationRepository, i64, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let users = SqlxUserRepository::new(pool.clone());
        let a = users
            .create(&User::new("a@example.com".into(), "h".into(), "A".into(), "".into(), false))
            .await
            .unwrap();
        let b = users
            .create(&User::new("b@example.com".into(), "h".into(), "B".into(), "".into(), false))
            .await
            .unwrap();
        (SqlxNotificationRepository::new(pool), a.id, b.id)
    }

    fn note(user_id: i64, title: &str) -> Notification {
        Notification::new(user_id, title.into(), "body".into(), Some("/dashboard".into()))
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let (repo, a, b) = setup().await;
        let first = repo.create(&note(a, "first")).await.unwrap();
        let second = repo.create(&note(a, "second")).await.unwrap();
        repo.create(&note(b, "other")).await.unwrap();
        assert!(first.id > 0);

        let listed = repo.list_for_user(a, false).await.unwrap();
        let ids: Vec<i64> = listed.iter().map(|n| n.id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&first.id) && ids.contains(&second.id));
        assert!(listed.iter().all(|n| n.user_id == a && !n.is_read));
    }

    #[tokio::test]
    async fn test_mark_read_scoped_to_recipient() {
        let (repo, a, b) = setup().await;
        let created = repo.create(&note(a, "hello")).await.unwrap();

        assert!(!repo.mark_read(b, created.id).await.unwrap());
        assert!(!repo.mark_read(a, created.id + 99).await.unwrap());
        assert!(repo.mark_read(a, created.id).await.unwrap());

        assert!(repo.list_for_user(a, true).await.unwrap().is_empty());
        assert!(repo.list_for_user(a, false).await.unwrap()[0].is_read);
    }

    #[tokio::test]
    async fn test_mark_all_read() {
        let (repo, a, b) = setup().await;
        repo.create(&note(a, "1")).await.unwrap();
        repo.create(&note(a, "2")).await.unwrap();
        repo.create(&note(b, "3")).await.unwrap();

        assert_eq!(repo.mark_all_read(a).await.unwrap(), 2);
        assert!(repo.list_for_user(a, true).await.unwrap().is_empty());
        assert_eq!(repo.list_for_user(b, true).await.unwrap().len(), 1);
    }
}
