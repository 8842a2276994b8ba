//! Booking repository
//!
//! Database operations for session bookings.
//!
//! This module provides:
//! - `BookingRepository` trait defining the interface for booking data access
//! - `SqlxBookingRepository` implementing the trait for SQLite and MySQL
//!
//! Uniqueness of accepted bookings per (mentor, start) is also enforced by a
//! storage index; see [`is_unique_violation`].

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Booking, BookingQuery, BookingStatus, BookingWithParties, Party, SessionDetails};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

const BOOKING_COLUMNS: &str = "b.id, b.mentor_id, b.mentee_id, b.mentor_email, b.mentee_email, \
     b.start_at, b.end_at, b.status, b.contact_email, b.topic, b.description, \
     b.meeting_id, b.meeting_link, b.created_at, b.updated_at";

const PARTY_COLUMNS: &str = "mu.first_name AS mentor_first_name, mu.last_name AS mentor_last_name, \
     me.first_name AS mentee_first_name, me.last_name AS mentee_last_name";

/// Booking repository trait
#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Insert a new booking
    async fn create(&self, booking: &Booking) -> Result<Booking>;

    /// Get booking by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Booking>>;

    /// All live bookings addressed to a mentor
    async fn list_by_mentor(&self, mentor_id: i64) -> Result<Vec<Booking>>;

    /// Mark a booking accepted and attach its meeting room
    async fn mark_accepted(&self, id: i64, meeting_id: &str, meeting_link: &str)
        -> Result<Booking>;

    /// Remove a booking
    async fn delete(&self, id: i64) -> Result<()>;

    /// Bookings where the user is mentor or mentee, filtered by `query`
    async fn list_for_user(
        &self,
        user_id: i64,
        query: BookingQuery,
        now: DateTime<Utc>,
    ) -> Result<Vec<BookingWithParties>>;

    /// Start times of the mentor's accepted bookings, ascending
    async fn accepted_starts(&self, mentor_id: i64) -> Result<Vec<DateTime<Utc>>>;
}

/// True when `err` came from the storage layer refusing a duplicate key.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<sqlx::Error>(),
            Some(sqlx::Error::Database(db_err)) if db_err.is_unique_violation()
        )
    })
}

/// SQLx-based booking repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxBookingRepository {
    pool: DynDatabasePool,
}

impl SqlxBookingRepository {
    /// Create a new SQLx booking repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn BookingRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl BookingRepository for SqlxBookingRepository {
    async fn create(&self, booking: &Booking) -> Result<Booking> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_booking_sqlite(self.pool.sqlite()?, booking).await,
            DatabaseDriver::Mysql => create_booking_mysql(self.pool.mysql()?, booking).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Booking>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_booking_by_id_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => get_booking_by_id_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn list_by_mentor(&self, mentor_id: i64) -> Result<Vec<Booking>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_by_mentor_sqlite(self.pool.sqlite()?, mentor_id).await,
            DatabaseDriver::Mysql => list_by_mentor_mysql(self.pool.mysql()?, mentor_id).await,
        }
    }

    async fn mark_accepted(
        &self,
        id: i64,
        meeting_id: &str,
        meeting_link: &str,
    ) -> Result<Booking> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                mark_accepted_sqlite(self.pool.sqlite()?, id, meeting_id, meeting_link).await
            }
            DatabaseDriver::Mysql => {
                mark_accepted_mysql(self.pool.mysql()?, id, meeting_id, meeting_link).await
            }
        }
    }

    async fn delete(&self, id: i64) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query("DELETE FROM bookings WHERE id = ?")
                    .bind(id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to delete booking")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query("DELETE FROM bookings WHERE id = ?")
                    .bind(id)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to delete booking")?;
            }
        }
        Ok(())
    }

    async fn list_for_user(
        &self,
        user_id: i64,
        query: BookingQuery,
        now: DateTime<Utc>,
    ) -> Result<Vec<BookingWithParties>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                list_for_user_sqlite(self.pool.sqlite()?, user_id, query, now).await
            }
            DatabaseDriver::Mysql => {
                list_for_user_mysql(self.pool.mysql()?, user_id, query, now).await
            }
        }
    }

    async fn accepted_starts(&self, mentor_id: i64) -> Result<Vec<DateTime<Utc>>> {
        let query = "SELECT start_at FROM bookings \
                     WHERE mentor_id = ? AND status = 'accepted' ORDER BY start_at ASC";
        let starts = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(query)
                    .bind(mentor_id)
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to list accepted bookings")?;
                rows.iter()
                    .map(|row| row.try_get("start_at"))
                    .collect::<Result<Vec<_>, _>>()?
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(query)
                    .bind(mentor_id)
                    .fetch_all(self.pool.mysql()?)
                    .await
                    .context("Failed to list accepted bookings")?;
                rows.iter()
                    .map(|row| row.try_get("start_at"))
                    .collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(starts)
    }
}

/// WHERE clause and ordering for a listing query. Binds: user id twice,
/// then `now` when the clause uses it.
fn listing_filter(query: BookingQuery) -> (&'static str, bool) {
    match query {
        BookingQuery::Upcoming => (
            "(b.mentor_id = ? OR b.mentee_id = ?) AND b.status = 'accepted' AND b.start_at >= ? \
             ORDER BY b.start_at ASC",
            true,
        ),
        BookingQuery::Past => (
            "(b.mentor_id = ? OR b.mentee_id = ?) AND b.start_at <= ? ORDER BY b.start_at DESC",
            true,
        ),
        BookingQuery::Pending => (
            "(b.mentor_id = ? OR b.mentee_id = ?) AND b.status = 'waiting' \
             ORDER BY b.start_at ASC",
            false,
        ),
    }
}

fn listing_sql(query: BookingQuery) -> (String, bool) {
    let (filter, binds_now) = listing_filter(query);
    let sql = format!(
        "SELECT {}, {} FROM bookings b \
         JOIN users mu ON mu.id = b.mentor_id \
         JOIN users me ON me.id = b.mentee_id \
         WHERE {}",
        BOOKING_COLUMNS, PARTY_COLUMNS, filter
    );
    (sql, binds_now)
}

fn parse_status(raw: &str) -> Result<BookingStatus> {
    BookingStatus::from_str(raw).context("Unknown booking status in storage")
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_booking_sqlite(pool: &SqlitePool, booking: &Booking) -> Result<Booking> {
    let result = sqlx::query(
        r#"
        INSERT INTO bookings (mentor_id, mentee_id, mentor_email, mentee_email, start_at, end_at,
                              status, contact_email, topic, description, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(booking.mentor_id)
    .bind(booking.mentee_id)
    .bind(&booking.mentor_email)
    .bind(&booking.mentee_email)
    .bind(booking.start_at)
    .bind(booking.end_at)
    .bind(booking.status.to_string())
    .bind(&booking.session.email)
    .bind(&booking.session.topic)
    .bind(&booking.session.description)
    .bind(booking.created_at)
    .bind(booking.updated_at)
    .execute(pool)
    .await
    .context("Failed to create booking")?;

    let id = result.last_insert_rowid();
    get_booking_by_id_sqlite(pool, id)
        .await?
        .context("Failed to fetch created booking")
}

async fn get_booking_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<Booking>> {
    let row = sqlx::query(&format!("SELECT {} FROM bookings b WHERE b.id = ?", BOOKING_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get booking by ID")?;

    row.as_ref().map(row_to_booking_sqlite).transpose()
}

async fn list_by_mentor_sqlite(pool: &SqlitePool, mentor_id: i64) -> Result<Vec<Booking>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM bookings b WHERE b.mentor_id = ? ORDER BY b.start_at ASC",
        BOOKING_COLUMNS
    ))
    .bind(mentor_id)
    .fetch_all(pool)
    .await
    .context("Failed to list mentor bookings")?;

    rows.iter().map(row_to_booking_sqlite).collect()
}

async fn mark_accepted_sqlite(
    pool: &SqlitePool,
    id: i64,
    meeting_id: &str,
    meeting_link: &str,
) -> Result<Booking> {
    sqlx::query(
        r#"
        UPDATE bookings
        SET status = 'accepted', meeting_id = ?, meeting_link = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(meeting_id)
    .bind(meeting_link)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to accept booking")?;

    get_booking_by_id_sqlite(pool, id)
        .await?
        .context("Booking not found after update")
}

async fn list_for_user_sqlite(
    pool: &SqlitePool,
    user_id: i64,
    query: BookingQuery,
    now: DateTime<Utc>,
) -> Result<Vec<BookingWithParties>> {
    let (sql, binds_now) = listing_sql(query);
    let mut q = sqlx::query(&sql).bind(user_id).bind(user_id);
    if binds_now {
        q = q.bind(now);
    }
    let rows = q
        .fetch_all(pool)
        .await
        .context("Failed to list bookings for user")?;

    rows.iter()
        .map(|row| {
            let booking = row_to_booking_sqlite(row)?;
            Ok(BookingWithParties {
                mentor: Party {
                    id: booking.mentor_id,
                    first_name: row.try_get("mentor_first_name")?,
                    last_name: row.try_get("mentor_last_name")?,
                },
                mentee: Party {
                    id: booking.mentee_id,
                    first_name: row.try_get("mentee_first_name")?,
                    last_name: row.try_get("mentee_last_name")?,
                },
                booking,
            })
        })
        .collect()
}

fn row_to_booking_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Booking> {
    let status: String = row.try_get("status")?;
    Ok(Booking {
        id: row.try_get("id")?,
        mentor_id: row.try_get("mentor_id")?,
        mentee_id: row.try_get("mentee_id")?,
        mentor_email: row.try_get("mentor_email")?,
        mentee_email: row.try_get("mentee_email")?,
        start_at: row.try_get("start_at")?,
        end_at: row.try_get("end_at")?,
        status: parse_status(&status)?,
        session: SessionDetails {
            email: row.try_get("contact_email")?,
            topic: row.try_get("topic")?,
            description: row.try_get("description")?,
        },
        meeting_id: row.try_get("meeting_id")?,
        meeting_link: row.try_get("meeting_link")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_booking_mysql(pool: &MySqlPool, booking: &Booking) -> Result<Booking> {
    let result = sqlx::query(
        r#"
        INSERT INTO bookings (mentor_id, mentee_id, mentor_email, mentee_email, start_at, end_at,
                              status, contact_email, topic, description, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(booking.mentor_id)
    .bind(booking.mentee_id)
    .bind(&booking.mentor_email)
    .bind(&booking.mentee_email)
    .bind(booking.start_at)
    .bind(booking.end_at)
    .bind(booking.status.to_string())
    .bind(&booking.session.email)
    .bind(&booking.session.topic)
    .bind(&booking.session.description)
    .bind(booking.created_at)
    .bind(booking.updated_at)
    .execute(pool)
    .await
    .context("Failed to create booking")?;

    let id = result.last_insert_id() as i64;
    get_booking_by_id_mysql(pool, id)
        .await?
        .context("Failed to fetch created booking")
}

async fn get_booking_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<Booking>> {
    let row = sqlx::query(&format!("SELECT {} FROM bookings b WHERE b.id = ?", BOOKING_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get booking by ID")?;

    row.as_ref().map(row_to_booking_mysql).transpose()
}

async fn list_by_mentor_mysql(pool: &MySqlPool, mentor_id: i64) -> Result<Vec<Booking>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM bookings b WHERE b.mentor_id = ? ORDER BY b.start_at ASC",
        BOOKING_COLUMNS
    ))
    .bind(mentor_id)
    .fetch_all(pool)
    .await
    .context("Failed to list mentor bookings")?;

    rows.iter().map(row_to_booking_mysql).collect()
}

async fn mark_accepted_mysql(
    pool: &MySqlPool,
    id: i64,
    meeting_id: &str,
    meeting_link: &str,
) -> Result<Booking> {
    sqlx::query(
        r#"
        UPDATE bookings
        SET status = 'accepted', meeting_id = ?, meeting_link = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(meeting_id)
    .bind(meeting_link)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to accept booking")?;

    get_booking_by_id_mysql(pool, id)
        .await?
        .context("Booking not found after update")
}

async fn list_for_user_mysql(
    pool: &MySqlPool,
    user_id: i64,
    query: BookingQuery,
    now: DateTime<Utc>,
) -> Result<Vec<BookingWithParties>> {
    let (sql, binds_now) = listing_sql(query);
    let mut q = sqlx::query(&sql).bind(user_id).bind(user_id);
    if binds_now {
        q = q.bind(now);
    }
    let rows = q
        .fetch_all(pool)
        .await
        .context("Failed to list bookings for user")?;

    rows.iter()
        .map(|row| {
            let booking = row_to_booking_mysql(row)?;
            Ok(BookingWithParties {
                mentor: Party {
                    id: booking.mentor_id,
                    first_name: row.try_get("mentor_first_name")?,
                    last_name: row.try_get("mentor_last_name")?,
                },
                mentee: Party {
                    id: booking.mentee_id,
                    first_name: row.try_get("mentee_first_name")?,
                    last_name: row.try_get("mentee_last_name")?,
                },
                booking,
            })
        })
        .collect()
}

fn row_to_booking_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Booking> {
    let status: String = row.try_get("status")?;
    Ok(Booking {
        id: row.try_get("id")?,
        mentor_id: row.try_get("mentor_id")?,
        mentee_id: row.try_get("mentee_id")?,
        mentor_email: row.try_get("mentor_email")?,
        mentee_email: row.try_get("mentee_email")?,
        start_at: row.try_get("start_at")?,
        end_at: row.try_get("end_at")?,
        status: parse_status(&status)?,
        session: SessionDetails {
            email: row.try_get("contact_email")?,
            topic: row.try_get("topic")?,
            description: row.try_get("description")?,
        },
        meeting_id: row.try_get("meeting_id")?,
        meeting_link: row.try_get("meeting_link")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::User;
    use chrono::{Duration, TimeZone};

    struct Fixture {
        repo: SqlxBookingRepository,
        mentor: i64,
        mentee: i64,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let users = SqlxUserRepository::new(pool.clone());
        let mentor = users
            .create(&User::new("mo@example.com".into(), "h".into(), "Mo".into(), "Mentor".into(), true))
            .await
            .unwrap();
        let mentee = users
            .create(&User::new("ed@example.com".into(), "h".into(), "Ed".into(), "Mentee".into(), false))
            .await
            .unwrap();
        Fixture {
            repo: SqlxBookingRepository::new(pool),
            mentor: mentor.id,
            mentee: mentee.id,
        }
    }

    fn booking(f: &Fixture, start: DateTime<Utc>) -> Booking {
        Booking::new(
            f.mentor,
            f.mentee,
            "mo@example.com".into(),
            "ed@example.com".into(),
            start,
            SessionDetails {
                email: None,
                topic: Some("Rust".into()),
                description: None,
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get_booking() {
        let f = setup().await;
        let start = Utc.with_ymd_and_hms(2030, 1, 7, 14, 0, 0).unwrap();
        let created = f.repo.create(&booking(&f, start)).await.unwrap();

        let fetched = f.repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.start_at, start);
        assert_eq!(fetched.end_at, start + Duration::hours(1));
        assert!(fetched.is_waiting());
        assert_eq!(fetched.session.topic.as_deref(), Some("Rust"));
        assert!(f.repo.get_by_id(created.id + 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mark_accepted_and_unique_index() {
        let f = setup().await;
        let start = Utc.with_ymd_and_hms(2030, 1, 7, 14, 0, 0).unwrap();
        let first = f.repo.create(&booking(&f, start)).await.unwrap();
        let second = f.repo.create(&booking(&f, start)).await.unwrap();

        let accepted = f
            .repo
            .mark_accepted(first.id, "room", "https://meet.jit.si/room")
            .await
            .unwrap();
        assert!(accepted.is_accepted());
        assert_eq!(accepted.meeting_link.as_deref(), Some("https://meet.jit.si/room"));

        let err = f
            .repo
            .mark_accepted(second.id, "room2", "https://meet.jit.si/room2")
            .await
            .unwrap_err();
        assert!(is_unique_violation(&err));
        assert_eq!(f.repo.accepted_starts(f.mentor).await.unwrap(), vec![start]);
    }

    #[tokio::test]
    async fn test_delete_booking() {
        let f = setup().await;
        let start = Utc.with_ymd_and_hms(2030, 1, 7, 14, 0, 0).unwrap();
        let created = f.repo.create(&booking(&f, start)).await.unwrap();
        f.repo.delete(created.id).await.unwrap();
        assert!(f.repo.get_by_id(created.id).await.unwrap().is_none());
        assert!(f.repo.list_by_mentor(f.mentor).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_for_user_queries() {
        let f = setup().await;
        let now = Utc::now();
        let past = f.repo.create(&booking(&f, now - Duration::days(2))).await.unwrap();
        let future_waiting = f.repo.create(&booking(&f, now + Duration::days(2))).await.unwrap();
        let future_accepted = f.repo.create(&booking(&f, now + Duration::days(3))).await.unwrap();
        f.repo
            .mark_accepted(future_accepted.id, "r", "https://meet.jit.si/r")
            .await
            .unwrap();

        let ids = |list: Vec<BookingWithParties>| -> Vec<i64> {
            list.into_iter().map(|b| b.booking.id).collect()
        };

        let upcoming = f.repo.list_for_user(f.mentee, BookingQuery::Upcoming, now).await.unwrap();
        assert_eq!(upcoming[0].mentor.first_name, "Mo");
        assert_eq!(upcoming[0].mentee.first_name, "Ed");
        assert_eq!(ids(upcoming), vec![future_accepted.id]);

        let past_list = f.repo.list_for_user(f.mentor, BookingQuery::Past, now).await.unwrap();
        assert_eq!(ids(past_list), vec![past.id]);

        let pending = f.repo.list_for_user(f.mentor, BookingQuery::Pending, now).await.unwrap();
        assert_eq!(ids(pending), vec![past.id, future_waiting.id]);

        let stranger = f.repo.list_for_user(f.mentor + f.mentee + 10, BookingQuery::Pending, now).await.unwrap();
        assert!(stranger.is_empty());
    }
}
