//! Value types shared by the importer pipeline.
//!
//! `User` and `Feed` are loaded once per run and never mutated. `Entry` is
//! built in memory from a parsed message and handed to the synchronizer; it
//! also serves as the record type of the JSON dump format, so every field
//! round-trips through serde.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default reading speed in words per minute for new users.
pub const DEFAULT_READING_SPEED: i64 = 265;

/// Default reading speed in characters per minute for CJK content.
pub const DEFAULT_CJK_READING_SPEED: i64 = 500;

/// Owner of feeds and entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
    /// Words per minute, used for non-CJK content
    pub default_reading_speed: i64,
    /// Characters per minute, used for Chinese, Japanese and Korean content
    pub cjk_reading_speed: i64,
}

/// A subscribed feed owned by a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feed {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    /// Unique per user; the key used by feed-map rules
    pub feed_url: String,
    /// Comma separated content rewrite rules, see [`crate::entry::rewrite`]
    pub rewrite_rules: String,
}

/// Read state of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    #[default]
    Unread,
    Read,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Unread => "unread",
            EntryStatus::Read => "read",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "unread" => Some(EntryStatus::Unread),
            "read" => Some(EntryStatus::Read),
            _ => None,
        }
    }
}

/// Attachment reference. Imported entries always carry an empty list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enclosure {
    pub url: String,
    pub mime_type: String,
    pub size: i64,
}

/// One normalized feed article ready for persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Store id, zero until the entry has been inserted
    #[serde(default)]
    pub id: i64,
    pub user_id: i64,
    pub feed_id: i64,
    /// Identity hash; must be non-empty before synchronization
    pub hash: String,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub author: String,
    pub content: String,
    /// Publication date, never later than `created_at`
    pub published_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub changed_at: DateTime<Utc>,
    #[serde(default)]
    pub status: EntryStatus,
    /// Estimated reading time in minutes
    #[serde(default)]
    pub reading_time: i64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub enclosures: Vec<Enclosure>,
}

/// Flip every entry in the collection to read.
pub fn mark_all_read(entries: &mut [Entry]) {
    for entry in entries.iter_mut() {
        entry.status = EntryStatus::Read;
    }
}
