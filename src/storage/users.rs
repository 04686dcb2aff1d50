use super::schema::Database;
use super::types::{DatabaseError, UserRow};
use crate::model::{User, DEFAULT_CJK_READING_SPEED, DEFAULT_READING_SPEED};

impl Database {
    // ========================================================================
    // User Operations
    // ========================================================================

    /// Look up a user by name.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::UserNotFound` when no such user exists.
    pub async fn user_by_username(&self, username: &str) -> Result<User, DatabaseError> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, username, default_reading_speed, cjk_reading_speed FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        row.map(UserRow::into_user)
            .ok_or_else(|| DatabaseError::UserNotFound(username.to_string()))
    }

    /// Create a user with default reading speeds, returning its id.
    pub async fn insert_user(&self, username: &str) -> Result<i64, DatabaseError> {
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO users (username, default_reading_speed, cjk_reading_speed) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(username)
        .bind(DEFAULT_READING_SPEED)
        .bind(DEFAULT_CJK_READING_SPEED)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(id)
    }
}
