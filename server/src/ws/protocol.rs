//! Named JSON events exchanged over the WebSocket.
//!
//! Every text frame is `{ "event": <name>, "data": <payload> }`; payload
//! fields are camelCase on the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CollabError;
use crate::matrix::model::OperationRecord;
use crate::notifications::Notification;

/// Events a client may send.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    JoinMatrix {
        matrix_id: String,
    },
    LeaveMatrix {
        matrix_id: String,
    },
    MatrixUpdate {
        matrix_id: String,
        #[serde(default)]
        changes: serde_json::Value,
        #[serde(default)]
        operation: serde_json::Value,
    },
    CellEdit {
        matrix_id: String,
        row: usize,
        col: usize,
        #[serde(default)]
        value: serde_json::Value,
        #[serde(default)]
        is_editing: bool,
    },
    CursorPosition {
        matrix_id: String,
        row: usize,
        col: usize,
    },
    TypingStart {
        matrix_id: String,
        #[serde(default)]
        comment_id: Option<String>,
    },
    TypingStop {
        matrix_id: String,
        #[serde(default)]
        comment_id: Option<String>,
    },
    NotificationRead {
        notification_id: String,
    },
    /// Any payload is accepted and ignored.
    Ping(Option<serde_json::Value>),
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinMatrix { .. } => "join_matrix",
            Self::LeaveMatrix { .. } => "leave_matrix",
            Self::MatrixUpdate { .. } => "matrix_update",
            Self::CellEdit { .. } => "cell_edit",
            Self::CursorPosition { .. } => "cursor_position",
            Self::TypingStart { .. } => "typing_start",
            Self::TypingStop { .. } => "typing_stop",
            Self::NotificationRead { .. } => "notification_read",
            Self::Ping(_) => "ping",
        }
    }

    pub fn parse(text: &str) -> Result<Self, CollabError> {
        serde_json::from_str(text)
            .map_err(|e| CollabError::InvalidInput(format!("Malformed event: {}", e)))
    }
}

/// Identity attached to presence and relay events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUser {
    pub id: String,
    pub username: String,
    pub full_name: String,
}

/// Events the server sends.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    Connected {
        user_id: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
    JoinedMatrix {
        matrix_id: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
    LeftMatrix {
        matrix_id: String,
        timestamp: DateTime<Utc>,
    },
    UserJoinedMatrix {
        matrix_id: String,
        user: PresenceUser,
        timestamp: DateTime<Utc>,
    },
    UserLeftMatrix {
        matrix_id: String,
        user: PresenceUser,
        timestamp: DateTime<Utc>,
    },
    UserDisconnected {
        matrix_id: String,
        user: PresenceUser,
        timestamp: DateTime<Utc>,
    },
    MatrixUpdated {
        matrix_id: String,
        changes: serde_json::Value,
        operation: serde_json::Value,
        updated_by: PresenceUser,
        timestamp: DateTime<Utc>,
    },
    MatrixUpdateConfirmed {
        matrix_id: String,
        timestamp: DateTime<Utc>,
    },
    CellBeingEdited {
        matrix_id: String,
        row: usize,
        col: usize,
        value: serde_json::Value,
        is_editing: bool,
        editor: PresenceUser,
        timestamp: DateTime<Utc>,
    },
    UserCursor {
        matrix_id: String,
        row: usize,
        col: usize,
        user: PresenceUser,
        timestamp: DateTime<Utc>,
    },
    UserTyping {
        matrix_id: String,
        comment_id: Option<String>,
        user: PresenceUser,
        timestamp: DateTime<Utc>,
    },
    UserStoppedTyping {
        matrix_id: String,
        comment_id: Option<String>,
        user: PresenceUser,
        timestamp: DateTime<Utc>,
    },
    NotificationMarkedRead {
        notification_id: String,
        timestamp: DateTime<Utc>,
    },
    NewNotification {
        notification: Notification,
    },
    MatrixNotification {
        matrix_id: String,
        operation: OperationRecord,
        timestamp: DateTime<Utc>,
    },
    Pong {
        timestamp: DateTime<Utc>,
    },
    Error {
        message: String,
        kind: String,
    },
}

impl ServerEvent {
    pub fn error(err: &CollabError) -> Self {
        Self::Error {
            message: err.to_string(),
            kind: err.kind().to_string(),
        }
    }

    pub fn to_json(&self) -> Option<String> {
        match serde_json::to_string(self) {
            Ok(json) => Some(json),
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode server event");
                None
            }
        }
    }
}
