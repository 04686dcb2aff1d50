use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{Entry, EntryStatus, Feed, User};

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds a lock on the database
    #[error("The database is locked by another process. Please close it and try again.")]
    InstanceLocked,

    /// The database schema does not match the version this tool was built for
    #[error("Schema version mismatch: expected {expected}, found {found}. You must run the SQL migrations.")]
    SchemaMismatch { expected: i64, found: i64 },

    /// No user with the given name exists
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// A stored value could not be decoded or encoded
    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5), SQLITE_LOCKED (6), SQLITE_CANTOPEN (14)
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::Other(err)
    }
}

// ============================================================================
// Write Outcomes
// ============================================================================

/// What happened to a single entry during a feed refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryWrite {
    /// New row created with this id
    Inserted(i64),
    /// Existing row overwritten
    Updated(i64),
    /// Existing row left untouched (overwrite disabled)
    Unchanged,
}

impl EntryWrite {
    /// Store id to record on the in-memory entry, if any
    pub fn id(&self) -> Option<i64> {
        match self {
            EntryWrite::Inserted(id) | EntryWrite::Updated(id) => Some(*id),
            EntryWrite::Unchanged => None,
        }
    }
}

// ============================================================================
// Row Types
// ============================================================================

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct UserRow {
    pub id: i64,
    pub username: String,
    pub default_reading_speed: i64,
    pub cjk_reading_speed: i64,
}

impl UserRow {
    pub(crate) fn into_user(self) -> User {
        User {
            id: self.id,
            username: self.username,
            default_reading_speed: self.default_reading_speed,
            cjk_reading_speed: self.cjk_reading_speed,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FeedRow {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub feed_url: String,
    pub rewrite_rules: String,
}

impl FeedRow {
    pub(crate) fn into_feed(self) -> Feed {
        Feed {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            feed_url: self.feed_url,
            rewrite_rules: self.rewrite_rules,
        }
    }
}

/// Internal row type for Entry queries
/// Timestamps are Unix seconds, tags a JSON array.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct EntryRow {
    pub id: i64,
    pub user_id: i64,
    pub feed_id: i64,
    pub hash: String,
    pub title: String,
    pub url: String,
    pub author: String,
    pub content: String,
    pub published_at: i64,
    pub created_at: i64,
    pub changed_at: i64,
    pub status: String,
    pub reading_time: i64,
    pub tags: String,
}

impl EntryRow {
    pub(crate) fn into_entry(self) -> Result<Entry, DatabaseError> {
        let tags: Vec<String> = serde_json::from_str(&self.tags)?;
        let status = EntryStatus::parse(&self.status).unwrap_or_else(|| {
            tracing::warn!(entry_id = self.id, status = %self.status, "Unknown entry status, treating as unread");
            EntryStatus::Unread
        });

        Ok(Entry {
            id: self.id,
            user_id: self.user_id,
            feed_id: self.feed_id,
            hash: self.hash,
            title: self.title,
            url: self.url,
            author: self.author,
            content: self.content,
            published_at: from_timestamp(self.published_at),
            created_at: from_timestamp(self.created_at),
            changed_at: from_timestamp(self.changed_at),
            status,
            reading_time: self.reading_time,
            tags,
            enclosures: Vec::new(),
        })
    }
}

fn from_timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}
