//! Per-user notifications.
//!
//! The real-time layer only needs two things from here: recording that a
//! notification was read, and creating one to push to a live connection.

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use serde::Serialize;
use uuid::Uuid;

use crate::db::{lock, DbPool};
use crate::error::{CollabError, CollabResult};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub recipient_id: String,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub matrix_id: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub recipient_id: String,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub matrix_id: Option<String>,
}

pub trait NotificationService: Send + Sync {
    fn create(&self, new: NewNotification) -> CollabResult<Notification>;

    /// Mark a notification read. Fails with NotFound unless it belongs to `user_id`.
    fn mark_read(&self, notification_id: &str, user_id: &str) -> CollabResult<()>;

    fn unread(&self, user_id: &str) -> CollabResult<Vec<Notification>>;
}

#[derive(Clone)]
pub struct SqliteNotificationService {
    db: DbPool,
}

impl SqliteNotificationService {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

impl NotificationService for SqliteNotificationService {
    fn create(&self, new: NewNotification) -> CollabResult<Notification> {
        let conn = lock(&self.db)?;
        let notification = Notification {
            id: Uuid::now_v7().to_string(),
            recipient_id: new.recipient_id,
            kind: new.kind,
            title: new.title,
            message: new.message,
            matrix_id: new.matrix_id,
            is_read: false,
            created_at: Utc::now(),
        };
        conn.execute(
            "INSERT INTO notifications (id, recipient_id, kind, title, message, matrix_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                notification.id,
                notification.recipient_id,
                notification.kind,
                notification.title,
                notification.message,
                notification.matrix_id,
                notification.created_at.to_rfc3339(),
            ],
        )?;
        Ok(notification)
    }

    fn mark_read(&self, notification_id: &str, user_id: &str) -> CollabResult<()> {
        let conn = lock(&self.db)?;
        let owner: Option<String> = conn
            .query_row(
                "SELECT recipient_id FROM notifications WHERE id = ?1",
                [notification_id],
                |row| row.get(0),
            )
            .optional()?;
        if owner.as_deref() != Some(user_id) {
            return Err(CollabError::NotFound("Notification".to_string()));
        }
        conn.execute(
            "UPDATE notifications SET is_read = 1, read_at = COALESCE(read_at, ?1) WHERE id = ?2",
            rusqlite::params![Utc::now().to_rfc3339(), notification_id],
        )?;
        Ok(())
    }

    fn unread(&self, user_id: &str) -> CollabResult<Vec<Notification>> {
        let conn = lock(&self.db)?;
        let mut stmt = conn.prepare(
            "SELECT id, recipient_id, kind, title, message, matrix_id, created_at
             FROM notifications WHERE recipient_id = ?1 AND is_read = 0
             ORDER BY created_at ASC",
        )?;
        let rows: Vec<Notification> = stmt
            .query_map([user_id], |row| {
                let created_at: String = row.get(6)?;
                Ok(Notification {
                    id: row.get(0)?,
                    recipient_id: row.get(1)?,
                    kind: row.get(2)?,
                    title: row.get(3)?,
                    message: row.get(4)?,
                    matrix_id: row.get(5)?,
                    is_read: false,
                    created_at: DateTime::parse_from_rfc3339(&created_at)
                        .map(|t| t.with_timezone(&Utc))
                        .unwrap_or_default(),
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }
}
