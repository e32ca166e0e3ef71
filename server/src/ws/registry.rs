use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

use super::broadcast::{force_close, send_event};
use super::protocol::{PresenceUser, ServerEvent};
use super::rooms::RoomManager;
use super::ConnectionSender;

/// One live authenticated session.
#[derive(Debug, Clone)]
pub struct Connection {
    /// Distinguishes successive connections of the same user.
    pub id: Uuid,
    pub user_id: String,
    pub username: String,
    pub full_name: String,
    pub sender: ConnectionSender,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Connection {
    pub fn new(user_id: &str, username: &str, sender: ConnectionSender) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            username: username.to_string(),
            full_name: String::new(),
            sender,
            connected_at: now,
            last_activity: now,
        }
    }

    pub fn with_full_name(mut self, full_name: &str) -> Self {
        self.full_name = full_name.to_string();
        self
    }

    pub fn presence_user(&self) -> PresenceUser {
        PresenceUser {
            id: self.user_id.clone(),
            username: self.username.clone(),
            full_name: self.full_name.clone(),
        }
    }

    pub fn send(&self, event: &ServerEvent) -> bool {
        send_event(&self.sender, event)
    }

    pub fn close(&self, code: u16, reason: &str) {
        force_close(&self.sender, code, reason);
    }
}

/// Read-only view of a registry entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSummary {
    pub user_id: String,
    pub username: String,
    pub full_name: String,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub rooms: Vec<String>,
}

/// Process-wide map of user id to that user's single live connection.
///
/// Each operation takes the shard lock for one key only, so operations on
/// different users proceed independently while operations on the same user
/// serialize.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<DashMap<String, Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `connection`, returning the entry it replaced, if any.
    ///
    /// The caller owns the returned connection and must tear it down: leave
    /// its rooms and close its transport.
    pub fn admit(&self, connection: Connection) -> Option<Connection> {
        let user_id = connection.user_id.clone();
        let superseded = self.connections.insert(user_id.clone(), connection);
        tracing::debug!(
            user_id = %user_id,
            superseded = superseded.is_some(),
            connections = self.connections.len(),
            "Connection admitted"
        );
        superseded
    }

    /// Record activity for the user's live connection.
    pub fn touch(&self, user_id: &str) -> bool {
        match self.connections.get_mut(user_id) {
            Some(mut entry) => {
                entry.last_activity = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Like `touch`, but only while `connection_id` is still the user's live
    /// connection. Returns false for a superseded or evicted connection.
    pub fn touch_connection(&self, user_id: &str, connection_id: Uuid) -> bool {
        match self.connections.get_mut(user_id) {
            Some(mut entry) if entry.id == connection_id => {
                entry.last_activity = Utc::now();
                true
            }
            _ => false,
        }
    }

    pub fn is_current(&self, user_id: &str, connection_id: Uuid) -> bool {
        self.connections
            .get(user_id)
            .is_some_and(|entry| entry.id == connection_id)
    }

    pub fn remove(&self, user_id: &str) -> Option<Connection> {
        self.connections.remove(user_id).map(|(_, conn)| conn)
    }

    /// Remove the entry only if it still belongs to connection `connection_id`.
    /// A superseded connection's teardown must not evict its replacement.
    pub fn remove_connection(&self, user_id: &str, connection_id: Uuid) -> Option<Connection> {
        self.connections
            .remove_if(user_id, |_, conn| conn.id == connection_id)
            .map(|(_, conn)| conn)
    }

    /// Remove connection `connection_id` only if it is still idle since before
    /// `cutoff`. The check and the removal happen under one shard lock, so a
    /// concurrent `touch` either lands first and saves the entry or not at all.
    pub fn remove_if_idle(
        &self,
        user_id: &str,
        connection_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Option<Connection> {
        self.connections
            .remove_if(user_id, |_, conn| {
                conn.id == connection_id && conn.last_activity < cutoff
            })
            .map(|(_, conn)| conn)
    }

    pub fn get(&self, user_id: &str) -> Option<Connection> {
        self.connections.get(user_id).map(|entry| entry.value().clone())
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }

    /// Summaries of every live connection, with room membership filled in from `rooms`.
    pub fn list(&self, rooms: &RoomManager) -> Vec<ConnectionSummary> {
        let snapshot: Vec<Connection> = self
            .connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        snapshot
            .into_iter()
            .map(|conn| ConnectionSummary {
                rooms: rooms.rooms_of(conn.id),
                user_id: conn.user_id,
                username: conn.username,
                full_name: conn.full_name,
                connected_at: conn.connected_at,
                last_activity: conn.last_activity,
            })
            .collect()
    }

    /// Deliver an event to a user's personal channel. Returns false if offline.
    pub fn send_to_user(&self, user_id: &str, event: &ServerEvent) -> bool {
        let sender = match self.connections.get(user_id) {
            Some(entry) => entry.sender.clone(),
            None => return false,
        };
        send_event(&sender, event)
    }

    /// Snapshot of connections whose last activity is before `cutoff`.
    pub fn idle_since(&self, cutoff: DateTime<Utc>) -> Vec<Connection> {
        self.connections
            .iter()
            .filter(|entry| entry.last_activity < cutoff)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Test hook: backdate a connection's last activity.
    #[cfg(test)]
    pub(crate) fn set_last_activity(&self, user_id: &str, at: DateTime<Utc>) {
        if let Some(mut entry) = self.connections.get_mut(user_id) {
            entry.last_activity = at;
        }
    }
}
