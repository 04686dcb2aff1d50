use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::DatabaseError;

/// Schema version this build reads and writes, stored in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 1;

// ============================================================================
// Database
// ============================================================================

#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open a connection pool.
    ///
    /// `location` is either a `sqlite:` URL or a plain file path; `:memory:`
    /// opens a private in-memory database. The schema is neither created nor
    /// checked here, see [`Database::check_schema`] and
    /// [`Database::create_schema`].
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::InstanceLocked` if another process has the
    /// database locked, `DatabaseError::Other` for anything else.
    pub async fn open(location: &str) -> Result<Self, DatabaseError> {
        let in_memory = location == ":memory:" || location == "sqlite::memory:";
        let url = if location.starts_with("sqlite:") {
            location.to_string()
        } else {
            format!("sqlite:{}?mode=rwc", location)
        };

        // busy_timeout=5000: wait up to 5 seconds for locks before SQLITE_BUSY.
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(DatabaseError::from_sqlx)?
            .pragma("busy_timeout", "5000")
            .foreign_keys(true);

        // An in-memory database only exists inside its single connection.
        let max_connections = if in_memory { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        Ok(Self { pool })
    }

    /// Verify the store is reachable.
    pub async fn ping(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        Ok(())
    }

    /// Current value of `PRAGMA user_version`.
    pub async fn schema_version(&self) -> Result<i64, DatabaseError> {
        let (version,): (i64,) = sqlx::query_as("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        Ok(version)
    }

    /// Fail unless the database schema matches [`SCHEMA_VERSION`].
    pub async fn check_schema(&self) -> Result<(), DatabaseError> {
        let found = self.schema_version().await?;
        if found != SCHEMA_VERSION {
            return Err(DatabaseError::SchemaMismatch {
                expected: SCHEMA_VERSION,
                found,
            });
        }
        Ok(())
    }

    /// Create a fresh schema inside one transaction.
    ///
    /// All statements use `IF NOT EXISTS`, so running this against a database
    /// already at [`SCHEMA_VERSION`] is a no-op. Upgrading older schemas is not
    /// supported.
    pub async fn create_schema(&self) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                username TEXT UNIQUE NOT NULL,
                default_reading_speed INTEGER NOT NULL DEFAULT 265,
                cjk_reading_speed INTEGER NOT NULL DEFAULT 500
            )
        "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feeds (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                feed_url TEXT NOT NULL,
                rewrite_rules TEXT NOT NULL DEFAULT '',
                UNIQUE(user_id, feed_url)
            )
        "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entries (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                feed_id INTEGER NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
                hash TEXT NOT NULL,
                title TEXT NOT NULL,
                url TEXT NOT NULL,
                author TEXT NOT NULL DEFAULT '',
                content TEXT NOT NULL,
                published_at INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                changed_at INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'unread',
                reading_time INTEGER NOT NULL DEFAULT 0,
                tags TEXT NOT NULL DEFAULT '[]',
                UNIQUE(feed_id, hash)
            )
        "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        // Hash deletes are scoped by user
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_entries_user_hash ON entries(user_id, hash)")
            .execute(&mut *tx)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        sqlx::query(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))
            .execute(&mut *tx)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;
        tracing::info!(version = SCHEMA_VERSION, "Database schema created");
        Ok(())
    }
}
