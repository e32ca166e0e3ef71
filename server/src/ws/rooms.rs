use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use super::broadcast::{encode, fan_out};
use super::protocol::ServerEvent;
use super::registry::Connection;
use super::ConnectionSender;

/// A connection's membership in one room.
#[derive(Debug, Clone)]
pub struct RoomMember {
    pub connection_id: Uuid,
    pub user_id: String,
    pub username: String,
    pub sender: ConnectionSender,
}

/// Rooms keyed by matrix id. Membership is per connection, not per user, so a
/// superseded connection's teardown never touches its replacement's rooms.
#[derive(Debug, Clone, Default)]
pub struct RoomManager {
    rooms: Arc<DashMap<String, HashMap<Uuid, RoomMember>>>,
}

impl RoomManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the connection to the room. Idempotent.
    pub fn join(&self, matrix_id: &str, connection: &Connection) {
        self.rooms.entry(matrix_id.to_string()).or_default().insert(
            connection.id,
            RoomMember {
                connection_id: connection.id,
                user_id: connection.user_id.clone(),
                username: connection.username.clone(),
                sender: connection.sender.clone(),
            },
        );
    }

    /// Remove the connection from the room. Returns whether it was a member.
    /// Empty rooms are dropped.
    pub fn leave(&self, matrix_id: &str, connection_id: Uuid) -> bool {
        let removed = match self.rooms.get_mut(matrix_id) {
            Some(mut members) => members.remove(&connection_id).is_some(),
            None => return false,
        };
        self.rooms.remove_if(matrix_id, |_, members| members.is_empty());
        removed
    }

    /// Remove the connection from every room, returning the rooms it was in.
    pub fn leave_all(&self, connection_id: Uuid) -> Vec<String> {
        let joined = self.rooms_of(connection_id);
        for matrix_id in &joined {
            self.leave(matrix_id, connection_id);
        }
        joined
    }

    #[cfg(test)]
    pub(crate) fn is_member(&self, matrix_id: &str, connection_id: Uuid) -> bool {
        self.rooms
            .get(matrix_id)
            .map(|members| members.contains_key(&connection_id))
            .unwrap_or(false)
    }

    #[cfg(test)]
    pub(crate) fn members(&self, matrix_id: &str) -> Vec<RoomMember> {
        self.rooms
            .get(matrix_id)
            .map(|members| members.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn rooms_of(&self, connection_id: Uuid) -> Vec<String> {
        let mut joined: Vec<String> = self
            .rooms
            .iter()
            .filter(|entry| entry.value().contains_key(&connection_id))
            .map(|entry| entry.key().clone())
            .collect();
        joined.sort();
        joined
    }

    #[cfg(test)]
    pub(crate) fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Send `event` to every member of the room except `exclude`.
    /// Returns the number of members it was queued for.
    pub fn broadcast(&self, matrix_id: &str, event: &ServerEvent, exclude: Option<Uuid>) -> usize {
        // Collect senders first so no shard lock is held while sending.
        let senders: Vec<ConnectionSender> = match self.rooms.get(matrix_id) {
            Some(members) => members
                .values()
                .filter(|m| Some(m.connection_id) != exclude)
                .map(|m| m.sender.clone())
                .collect(),
            None => return 0,
        };
        if senders.is_empty() {
            return 0;
        }
        match encode(event) {
            Some(msg) => fan_out(senders.iter(), &msg),
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::ws::Message;
    use chrono::Utc;
    use tokio::sync::mpsc;

    fn conn(user: &str) -> (Connection, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Connection::new(user, user, tx), rx)
    }

    #[test]
    fn broadcast_excludes_sender() {
        let rooms = RoomManager::new();
        let (a, mut rx_a) = conn("alice");
        let (b, mut rx_b) = conn("bob");
        let (c, mut rx_c) = conn("carol");
        rooms.join("m1", &a);
        rooms.join("m1", &b);
        rooms.join("m2", &c);

        let event = ServerEvent::Pong { timestamp: Utc::now() };
        assert_eq!(rooms.broadcast("m1", &event, Some(a.id)), 1);
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
        assert!(rx_c.try_recv().is_err());

        assert_eq!(rooms.broadcast("m1", &event, None), 2);
        assert_eq!(rooms.broadcast("nowhere", &event, None), 0);
    }

    #[test]
    fn join_is_idempotent_and_empty_rooms_vanish() {
        let rooms = RoomManager::new();
        let (a, _rx) = conn("alice");
        rooms.join("m1", &a);
        rooms.join("m1", &a);
        assert_eq!(rooms.members("m1").len(), 1);

        assert!(rooms.leave("m1", a.id));
        assert!(!rooms.leave("m1", a.id));
        assert_eq!(rooms.room_count(), 0);
    }

    #[test]
    fn leave_all_reports_rooms() {
        let rooms = RoomManager::new();
        let (a, _rx) = conn("alice");
        let (b, _rxb) = conn("bob");
        rooms.join("m2", &a);
        rooms.join("m1", &a);
        rooms.join("m1", &b);

        assert_eq!(rooms.leave_all(a.id), vec!["m1".to_string(), "m2".to_string()]);
        assert!(rooms.rooms_of(a.id).is_empty());
        assert!(rooms.is_member("m1", b.id));
        assert_eq!(rooms.room_count(), 1);
    }
}
