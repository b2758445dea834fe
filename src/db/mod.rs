/// Database layer for the moderation engine
///
/// Manages the SQLite connection pool, embedded migrations, and the
/// timestamp encoding shared by every table.

use crate::error::{ModResult, ModerationError};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Database connection options
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    pub max_connections: u32,
    pub enable_wal: bool,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            enable_wal: true,
        }
    }
}

/// Create a SQLite connection pool backed by a file
pub async fn create_pool(path: &Path, options: DatabaseOptions) -> ModResult<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(options.max_connections)
        .connect_with(
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(if options.enable_wal {
                    SqliteJournalMode::Wal
                } else {
                    SqliteJournalMode::Delete
                })
                .foreign_keys(true)
                .busy_timeout(std::time::Duration::from_secs(5)),
        )
        .await?;

    Ok(pool)
}

/// Create an in-memory pool with migrations applied
///
/// Limited to a single connection so every query sees the same database.
pub async fn create_memory_pool() -> ModResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;
    Ok(pool)
}

/// Run migrations embedded at compile time from ./migrations
pub async fn run_migrations(pool: &SqlitePool) -> ModResult<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| ModerationError::Internal(format!("Migration failed: {}", e)))?;

    Ok(())
}

/// Test database connection
pub async fn test_connection(pool: &SqlitePool) -> ModResult<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Encode a timestamp for storage.
///
/// Fixed width, so text comparison in SQL matches time order.
pub fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Decode a stored timestamp
pub fn parse_ts(value: &str) -> ModResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ModerationError::Internal(format!("Invalid timestamp {:?}: {}", value, e)))
}

/// Decode an optional stored timestamp
pub fn parse_opt_ts(value: Option<String>) -> ModResult<Option<DateTime<Utc>>> {
    value.as_deref().map(parse_ts).transpose()
}

/// True when a database error was raised by one of the immutability triggers
pub fn is_immutability_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            let message = db_err.message();
            message.contains("immutable") || message.contains("never deleted") || message.contains("append-only")
        }
        _ => false,
    }
}

/// True when a database error is a uniqueness/primary key violation
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_timestamp_encoding_sorts_lexicographically() {
        let base = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let later = base + Duration::milliseconds(500);
        let much_later = base + Duration::seconds(10);

        assert_eq!(ts(base), "2025-03-01T12:00:00.000000Z");
        assert!(ts(base) < ts(later));
        assert!(ts(later) < ts(much_later));
        assert_eq!(parse_ts(&ts(later)).unwrap(), later);
    }

    #[tokio::test]
    async fn test_memory_pool_runs_migrations() {
        let pool = create_memory_pool().await.unwrap();
        test_connection(&pool).await.unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE '\\_%' ESCAPE '\\' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        for expected in [
            "action_reversal",
            "content_item",
            "moderation_action",
            "notification_outbox",
            "report",
            "security_event",
            "user_account",
            "user_restriction",
        ] {
            assert!(tables.iter().any(|t| t == expected), "missing table {}", expected);
        }
    }

    #[tokio::test]
    async fn test_file_pool_creates_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("moderation.sqlite");

        let pool = create_pool(&path, DatabaseOptions::default()).await.unwrap();
        run_migrations(&pool).await.unwrap();
        test_connection(&pool).await.unwrap();

        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_security_events_are_append_only() {
        let pool = create_memory_pool().await.unwrap();
        sqlx::query("INSERT INTO security_event (event_type, details, created_at) VALUES ('x', '{}', ?)")
            .bind(ts(Utc::now()))
            .execute(&pool)
            .await
            .unwrap();

        let err = sqlx::query("DELETE FROM security_event").execute(&pool).await.unwrap_err();
        assert!(is_immutability_violation(&err));
    }
}
