//! Database migrations module
//!
//! Code-based migrations for both SQLite and MySQL, embedded in the binary.
//!
//! Each migration is a `Migration` struct containing:
//! - `version`: Unique version number for ordering
//! - `name`: Human-readable migration name
//! - `up_sqlite`: SQL for SQLite database
//! - `up_mysql`: SQL for MySQL database

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};

use super::DynDatabasePool;
use crate::config::DatabaseDriver;

/// A database migration with SQL for both SQLite and MySQL
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version number (must be unique and sequential)
    pub version: i32,
    /// Human-readable migration name
    pub name: &'static str,
    /// SQL statements for SQLite
    pub up_sqlite: &'static str,
    /// SQL statements for MySQL
    pub up_mysql: &'static str,
}

/// Migration record stored in the database
#[derive(Debug, Clone)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

/// All migrations, in application order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_users",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email VARCHAR(255) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                first_name VARCHAR(100) NOT NULL,
                last_name VARCHAR(100) NOT NULL DEFAULT '',
                phone VARCHAR(32),
                timezone VARCHAR(64) NOT NULL DEFAULT 'UTC',
                is_mentor BOOLEAN NOT NULL DEFAULT 0,
                sessions_requested INTEGER NOT NULL DEFAULT 0,
                last_session_requested TIMESTAMP,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_users_email ON users(email);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                email VARCHAR(255) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                first_name VARCHAR(100) NOT NULL,
                last_name VARCHAR(100) NOT NULL DEFAULT '',
                phone VARCHAR(32),
                timezone VARCHAR(64) NOT NULL DEFAULT 'UTC',
                is_mentor BOOLEAN NOT NULL DEFAULT FALSE,
                sessions_requested BIGINT NOT NULL DEFAULT 0,
                last_session_requested DATETIME,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX idx_users_email ON users(email);
        "#,
    },
    Migration {
        version: 2,
        name: "create_sessions",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id VARCHAR(64) PRIMARY KEY,
                user_id INTEGER NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id VARCHAR(64) PRIMARY KEY,
                user_id BIGINT NOT NULL,
                expires_at DATETIME NOT NULL,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_sessions_user_id ON sessions(user_id);
            CREATE INDEX idx_sessions_expires_at ON sessions(expires_at);
        "#,
    },
    Migration {
        version: 3,
        name: "create_mentors",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS mentors (
                user_id INTEGER PRIMARY KEY,
                is_mentoring BOOLEAN NOT NULL DEFAULT 0,
                session_requests INTEGER NOT NULL DEFAULT 0,
                active_sessions INTEGER NOT NULL DEFAULT 0,
                last_session_request TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS mentor_slots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                mentor_id INTEGER NOT NULL,
                day_of_week INTEGER NOT NULL,
                hour INTEGER NOT NULL,
                minute INTEGER NOT NULL,
                FOREIGN KEY (mentor_id) REFERENCES mentors(user_id) ON DELETE CASCADE,
                UNIQUE (mentor_id, day_of_week, hour, minute)
            );
            CREATE INDEX IF NOT EXISTS idx_mentor_slots_mentor_id ON mentor_slots(mentor_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS mentors (
                user_id BIGINT PRIMARY KEY,
                is_mentoring BOOLEAN NOT NULL DEFAULT FALSE,
                session_requests BIGINT NOT NULL DEFAULT 0,
                active_sessions BIGINT NOT NULL DEFAULT 0,
                last_session_request DATETIME,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS mentor_slots (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                mentor_id BIGINT NOT NULL,
                day_of_week INT NOT NULL,
                hour INT NOT NULL,
                minute INT NOT NULL,
                FOREIGN KEY (mentor_id) REFERENCES mentors(user_id) ON DELETE CASCADE,
                UNIQUE KEY uq_mentor_slot (mentor_id, day_of_week, hour, minute)
            );
            CREATE INDEX idx_mentor_slots_mentor_id ON mentor_slots(mentor_id);
        "#,
    },
    // Accepted bookings are unique per (mentor, start) at the storage level too.
    Migration {
        version: 4,
        name: "create_bookings",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS bookings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                mentor_id INTEGER NOT NULL,
                mentee_id INTEGER NOT NULL,
                mentor_email VARCHAR(255) NOT NULL,
                mentee_email VARCHAR(255) NOT NULL,
                start_at TIMESTAMP NOT NULL,
                end_at TIMESTAMP NOT NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'waiting',
                contact_email VARCHAR(255),
                topic TEXT,
                description TEXT,
                meeting_id VARCHAR(64),
                meeting_link VARCHAR(255),
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (mentor_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (mentee_id) REFERENCES users(id) ON DELETE CASCADE,
                CHECK (start_at < end_at)
            );
            CREATE INDEX IF NOT EXISTS idx_bookings_mentor_id ON bookings(mentor_id);
            CREATE INDEX IF NOT EXISTS idx_bookings_mentee_id ON bookings(mentee_id);
            CREATE INDEX IF NOT EXISTS idx_bookings_status ON bookings(status);
            CREATE UNIQUE INDEX IF NOT EXISTS uq_bookings_mentor_accepted
                ON bookings(mentor_id, start_at) WHERE status = 'accepted';
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS bookings (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                mentor_id BIGINT NOT NULL,
                mentee_id BIGINT NOT NULL,
                mentor_email VARCHAR(255) NOT NULL,
                mentee_email VARCHAR(255) NOT NULL,
                start_at DATETIME NOT NULL,
                end_at DATETIME NOT NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'waiting',
                contact_email VARCHAR(255),
                topic TEXT,
                description TEXT,
                meeting_id VARCHAR(64),
                meeting_link VARCHAR(255),
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                accepted_start DATETIME GENERATED ALWAYS AS
                    (CASE WHEN status = 'accepted' THEN start_at ELSE NULL END) STORED,
                FOREIGN KEY (mentor_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (mentee_id) REFERENCES users(id) ON DELETE CASCADE,
                UNIQUE KEY uq_bookings_mentor_accepted (mentor_id, accepted_start),
                CHECK (start_at < end_at)
            );
            CREATE INDEX idx_bookings_mentor_id ON bookings(mentor_id);
            CREATE INDEX idx_bookings_mentee_id ON bookings(mentee_id);
            CREATE INDEX idx_bookings_status ON bookings(status);
        "#,
    },
    Migration {
        version: 5,
        name: "create_notifications",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS notifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                title VARCHAR(255) NOT NULL,
                body TEXT NOT NULL,
                link VARCHAR(255),
                is_read BOOLEAN NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_notifications_user_id ON notifications(user_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS notifications (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                user_id BIGINT NOT NULL,
                title VARCHAR(255) NOT NULL,
                body TEXT NOT NULL,
                link VARCHAR(255),
                is_read BOOLEAN NOT NULL DEFAULT FALSE,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_notifications_user_id ON notifications(user_id);
        "#,
    },
];

/// Run all pending migrations
///
/// # Returns
///
/// Number of migrations applied
pub async fn run_migrations(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = get_applied_migrations(pool).await?;
    let applied_versions: Vec<i32> = applied.iter().map(|m| m.version as i32).collect();

    let mut count = 0;

    for migration in MIGRATIONS {
        if !applied_versions.contains(&migration.version) {
            tracing::info!(
                "Applying migration {}: {}",
                migration.version,
                migration.name
            );
            apply_migration(pool, migration)
                .await
                .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
            count += 1;
        }
    }

    if count > 0 {
        tracing::info!("Applied {} migration(s)", count);
    } else {
        tracing::debug!("No pending migrations");
    }

    Ok(count)
}

async fn create_migrations_table(pool: &DynDatabasePool) -> Result<()> {
    let sql = match pool.driver() {
        DatabaseDriver::Sqlite => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
        DatabaseDriver::Mysql => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INT PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
    };

    pool.execute(sql).await?;
    Ok(())
}

async fn get_applied_migrations(pool: &DynDatabasePool) -> Result<Vec<MigrationRecord>> {
    match pool.driver() {
        DatabaseDriver::Sqlite => get_applied_migrations_sqlite(pool.sqlite()?).await,
        DatabaseDriver::Mysql => get_applied_migrations_mysql(pool.mysql()?).await,
    }
}

async fn get_applied_migrations_sqlite(pool: &SqlitePool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| MigrationRecord {
            version: row.get("version"),
            name: row.get("name"),
            applied_at: row.get("applied_at"),
        })
        .collect())
}

async fn get_applied_migrations_mysql(pool: &MySqlPool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| MigrationRecord {
            version: row.get::<i32, _>("version") as i64,
            name: row.get("name"),
            applied_at: row.get("applied_at"),
        })
        .collect())
}

async fn apply_migration(pool: &DynDatabasePool, migration: &Migration) -> Result<()> {
    match pool.driver() {
        DatabaseDriver::Sqlite => apply_migration_sqlite(pool.sqlite()?, migration).await,
        DatabaseDriver::Mysql => apply_migration_mysql(pool.mysql()?, migration).await,
    }
}

async fn apply_migration_sqlite(pool: &SqlitePool, migration: &Migration) -> Result<()> {
    for statement in split_sql_statements(migration.up_sqlite) {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(pool)
        .await?;

    Ok(())
}

async fn apply_migration_mysql(pool: &MySqlPool, migration: &Migration) -> Result<()> {
    for statement in split_sql_statements(migration.up_mysql) {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(pool)
        .await?;

    Ok(())
}

fn truncate_sql(sql: &str) -> String {
    match sql.char_indices().nth(100) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    }
}

/// Split SQL into individual statements, dropping comment-only fragments
fn split_sql_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty() && !is_comment_only(stmt))
        .collect()
}

fn is_comment_only(s: &str) -> bool {
    s.lines().all(|line| {
        let trimmed = line.trim();
        trimmed.is_empty() || trimmed.starts_with("--")
    })
}

/// Get pending migrations count
pub async fn pending_count(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;
    let applied = get_applied_migrations(pool).await?;
    Ok(MIGRATIONS.len().saturating_sub(applied.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    #[tokio::test]
    async fn test_run_migrations() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        let count = run_migrations(&pool).await.expect("Failed to run migrations");
        assert_eq!(count, MIGRATIONS.len());

        // Second run is a no-op
        let count = run_migrations(&pool).await.expect("Failed to rerun migrations");
        assert_eq!(count, 0);
        assert_eq!(pending_count(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_tables_created() {
        let pool = create_test_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();
        let sqlite = pool.sqlite().unwrap();

        for table in ["users", "sessions", "mentors", "mentor_slots", "bookings", "notifications"] {
            let row = sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name = ?")
                .bind(table)
                .fetch_optional(sqlite)
                .await
                .unwrap();
            assert!(row.is_some(), "table {} should exist", table);
        }
    }

    #[tokio::test]
    async fn test_accepted_bookings_unique_per_mentor_start() {
        let pool = create_test_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();
        let sqlite = pool.sqlite().unwrap();

        for email in ["mentor@example.com", "a@example.com", "b@example.com"] {
            sqlx::query("INSERT INTO users (email, password_hash, first_name) VALUES (?, 'x', 'n')")
                .bind(email)
                .execute(sqlite)
                .await
                .unwrap();
        }

        let insert = |mentee: i64, status: &'static str| {
            sqlx::query(
                "INSERT INTO bookings (mentor_id, mentee_id, mentor_email, mentee_email, start_at, end_at, status)
                 VALUES (1, ?, 'm', 'e', '2025-01-06T14:00:00+00:00', '2025-01-06T15:00:00+00:00', ?)",
            )
            .bind(mentee)
            .bind(status)
            .execute(sqlite)
        };

        insert(2, "waiting").await.expect("waiting insert");
        insert(3, "waiting").await.expect("second waiting insert");
        insert(2, "accepted").await.expect("first accepted insert");
        assert!(insert(3, "accepted").await.is_err());
    }

    #[test]
    fn test_split_sql_statements() {
        let sql = "CREATE TABLE a (id INT);\n-- comment only\n;\nCREATE INDEX i ON a(id);";
        let statements = split_sql_statements(sql);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("CREATE TABLE"));
        assert!(statements[1].starts_with("CREATE INDEX"));
    }

    #[test]
    fn test_is_comment_only() {
        assert!(is_comment_only("-- hello\n  -- world"));
        assert!(!is_comment_only("-- hello\nSELECT 1"));
    }
}
