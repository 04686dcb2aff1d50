mod entries;
mod feeds;
mod schema;
mod types;
mod users;

use async_trait::async_trait;

use crate::model::Entry;

pub use schema::{Database, SCHEMA_VERSION};
pub use types::{DatabaseError, EntryWrite};

/// Write side of the store consumed by the batch synchronizer.
///
/// Each call is expected to be atomic: on error nothing from the call is
/// persisted, so the caller may simply retry it.
#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Insert-or-update entries of one `(user, feed)` pair by identity hash.
    async fn refresh_feed_entries(
        &self,
        user_id: i64,
        feed_id: i64,
        entries: &[&Entry],
        overwrite: bool,
    ) -> Result<Vec<EntryWrite>, DatabaseError>;

    /// Delete a user's entries by identity hash, returning rows removed.
    async fn delete_entries_by_hash(
        &self,
        user_id: i64,
        hashes: &[String],
    ) -> Result<u64, DatabaseError>;
}

#[async_trait]
impl EntryStore for Database {
    async fn refresh_feed_entries(
        &self,
        user_id: i64,
        feed_id: i64,
        entries: &[&Entry],
        overwrite: bool,
    ) -> Result<Vec<EntryWrite>, DatabaseError> {
        Database::refresh_feed_entries(self, user_id, feed_id, entries, overwrite).await
    }

    async fn delete_entries_by_hash(
        &self,
        user_id: i64,
        hashes: &[String],
    ) -> Result<u64, DatabaseError> {
        Database::delete_entries_by_hash(self, user_id, hashes).await
    }
}
