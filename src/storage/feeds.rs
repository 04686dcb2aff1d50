use super::schema::Database;
use super::types::{DatabaseError, FeedRow};
use crate::model::Feed;

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// All feeds owned by a user, ordered by id.
    pub async fn feeds(&self, user_id: i64) -> Result<Vec<Feed>, DatabaseError> {
        let rows: Vec<FeedRow> = sqlx::query_as(
            r#"
                SELECT id, user_id, title, feed_url, rewrite_rules
                FROM feeds
                WHERE user_id = ?
                ORDER BY id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(rows.into_iter().map(FeedRow::into_feed).collect())
    }

    /// Subscribe a user to a feed (INSERT, or update title and rules on
    /// conflicting URL). Returns the feed id.
    pub async fn insert_feed(
        &self,
        user_id: i64,
        feed_url: &str,
        title: &str,
        rewrite_rules: &str,
    ) -> Result<i64, DatabaseError> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
                INSERT INTO feeds (user_id, feed_url, title, rewrite_rules)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(user_id, feed_url) DO UPDATE SET
                    title = excluded.title,
                    rewrite_rules = excluded.rewrite_rules
                RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(feed_url)
        .bind(title)
        .bind(rewrite_rules)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(id)
    }
}
