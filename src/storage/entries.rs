use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{DatabaseError, EntryRow, EntryWrite};
use crate::model::Entry;

/// Hashes per DELETE statement, well under SQLite's bound-parameter limit
const DELETE_CHUNK: usize = 500;

impl Database {
    // ========================================================================
    // Entry Operations
    // ========================================================================

    /// Insert-or-update entries of one feed, keyed by `(feed_id, hash)`.
    ///
    /// Runs in a single transaction: either every entry is written or none
    /// is. Existing entries are only overwritten when `overwrite` is set;
    /// their read status is never touched.
    ///
    /// # Returns
    ///
    /// One [`EntryWrite`] per input entry, in input order.
    pub async fn refresh_feed_entries(
        &self,
        user_id: i64,
        feed_id: i64,
        entries: &[&Entry],
        overwrite: bool,
    ) -> Result<Vec<EntryWrite>, DatabaseError> {
        let mut writes = Vec::with_capacity(entries.len());
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        for entry in entries {
            let tags = serde_json::to_string(&entry.tags)?;

            let existing: Option<(i64,)> =
                sqlx::query_as("SELECT id FROM entries WHERE feed_id = ? AND hash = ?")
                    .bind(feed_id)
                    .bind(&entry.hash)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(DatabaseError::from_sqlx)?;

            let write = match existing {
                Some((id,)) if overwrite => {
                    sqlx::query(
                        r#"
                        UPDATE entries SET
                            title = ?, url = ?, author = ?, content = ?,
                            published_at = ?, changed_at = ?, reading_time = ?, tags = ?
                        WHERE id = ?
                    "#,
                    )
                    .bind(&entry.title)
                    .bind(&entry.url)
                    .bind(&entry.author)
                    .bind(&entry.content)
                    .bind(entry.published_at.timestamp())
                    .bind(entry.changed_at.timestamp())
                    .bind(entry.reading_time)
                    .bind(&tags)
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .map_err(DatabaseError::from_sqlx)?;
                    EntryWrite::Updated(id)
                }
                Some(_) => EntryWrite::Unchanged,
                None => {
                    let (id,): (i64,) = sqlx::query_as(
                        r#"
                        INSERT INTO entries (
                            user_id, feed_id, hash, title, url, author, content,
                            published_at, created_at, changed_at, status, reading_time, tags
                        )
                        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                        RETURNING id
                    "#,
                    )
                    .bind(user_id)
                    .bind(feed_id)
                    .bind(&entry.hash)
                    .bind(&entry.title)
                    .bind(&entry.url)
                    .bind(&entry.author)
                    .bind(&entry.content)
                    .bind(entry.published_at.timestamp())
                    .bind(entry.created_at.timestamp())
                    .bind(entry.changed_at.timestamp())
                    .bind(entry.status.as_str())
                    .bind(entry.reading_time)
                    .bind(&tags)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(DatabaseError::from_sqlx)?;
                    EntryWrite::Inserted(id)
                }
            };
            writes.push(write);
        }

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;
        Ok(writes)
    }

    /// Delete a user's entries whose hash is in `hashes`.
    ///
    /// Returns the number of rows removed.
    pub async fn delete_entries_by_hash(
        &self,
        user_id: i64,
        hashes: &[String],
    ) -> Result<u64, DatabaseError> {
        if hashes.is_empty() {
            return Ok(0);
        }

        let mut removed = 0;
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        for chunk in hashes.chunks(DELETE_CHUNK) {
            let mut builder: QueryBuilder<sqlx::Sqlite> =
                QueryBuilder::new("DELETE FROM entries WHERE user_id = ");
            builder.push_bind(user_id);
            builder.push(" AND hash IN (");

            let mut separated = builder.separated(", ");
            for hash in chunk {
                separated.push_bind(hash);
            }
            separated.push_unseparated(")");

            removed += builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(DatabaseError::from_sqlx)?
                .rows_affected();
        }

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;
        Ok(removed)
    }

    /// All entries of a user, ordered by id.
    pub async fn entries_for_user(&self, user_id: i64) -> Result<Vec<Entry>, DatabaseError> {
        let rows: Vec<EntryRow> = sqlx::query_as(
            r#"
                SELECT id, user_id, feed_id, hash, title, url, author, content,
                       published_at, created_at, changed_at, status, reading_time, tags
                FROM entries
                WHERE user_id = ?
                ORDER BY id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        rows.into_iter().map(EntryRow::into_entry).collect()
    }
}
