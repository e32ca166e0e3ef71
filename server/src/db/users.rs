use chrono::Utc;
use rusqlite::OptionalExtension;
use serde::Serialize;
use uuid::Uuid;

use super::{lock, DbPool};
use crate::error::{CollabError, CollabResult};

/// Row in the users table.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub full_name: String,
    pub is_active: bool,
    pub created_at: String,
}

/// Insert a new active user and return it.
pub fn create_user(db: &DbPool, username: &str, full_name: &str) -> CollabResult<User> {
    let conn = lock(db)?;
    let user = User {
        id: Uuid::now_v7().to_string(),
        username: username.to_string(),
        full_name: full_name.to_string(),
        is_active: true,
        created_at: Utc::now().to_rfc3339(),
    };

    conn.execute(
        "INSERT INTO users (id, username, full_name, is_active, created_at) VALUES (?1, ?2, ?3, 1, ?4)",
        rusqlite::params![user.id, user.username, user.full_name, user.created_at],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            CollabError::InvalidInput(format!("Username '{}' is taken", username))
        }
        other => other.into(),
    })?;

    Ok(user)
}

/// Look up a user by id. Returns None if absent.
pub fn find_user(db: &DbPool, user_id: &str) -> CollabResult<Option<User>> {
    let conn = lock(db)?;
    let user = conn
        .query_row(
            "SELECT id, username, full_name, is_active, created_at FROM users WHERE id = ?1",
            [user_id],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    full_name: row.get(2)?,
                    is_active: row.get(3)?,
                    created_at: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(user)
}

pub fn set_active(db: &DbPool, user_id: &str, is_active: bool) -> CollabResult<()> {
    let conn = lock(db)?;
    let changed = conn.execute(
        "UPDATE users SET is_active = ?1 WHERE id = ?2",
        rusqlite::params![is_active, user_id],
    )?;
    if changed == 0 {
        return Err(CollabError::NotFound("User".to_string()));
    }
    Ok(())
}
