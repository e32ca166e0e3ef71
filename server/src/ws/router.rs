//! Event Broadcast Router.
//!
//! `dispatch` maps one inbound event to the list of outbound events it causes;
//! `deliver` performs the sends. Keeping the two apart lets the dispatch table
//! be tested without a socket.

use chrono::Utc;

use super::protocol::{ClientEvent, ServerEvent};
use super::registry::Connection;
use crate::error::CollabResult;
use crate::matrix::model::Matrix;
use crate::matrix::permissions::{self, Action};
use crate::state::AppState;

/// Where an outbound event goes.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// The connection that sent the inbound event.
    Sender,
    /// Every member of a matrix room, optionally skipping the sender.
    Room { matrix_id: String, exclude_sender: bool },
}

#[derive(Debug, Clone)]
pub struct Outbound {
    pub target: Target,
    pub event: ServerEvent,
}

impl Outbound {
    pub fn sender(event: ServerEvent) -> Self {
        Self {
            target: Target::Sender,
            event,
        }
    }

    pub fn room_peers(matrix_id: &str, event: ServerEvent) -> Self {
        Self {
            target: Target::Room {
                matrix_id: matrix_id.to_string(),
                exclude_sender: true,
            },
            event,
        }
    }

    pub fn room(matrix_id: &str, event: ServerEvent) -> Self {
        Self {
            target: Target::Room {
                matrix_id: matrix_id.to_string(),
                exclude_sender: false,
            },
            event,
        }
    }
}

/// Handle one inbound event. Failures become a single `error` event for the sender.
pub async fn dispatch(state: &AppState, conn: &Connection, event: ClientEvent) -> Vec<Outbound> {
    let name = event.name();
    match route(state, conn, event).await {
        Ok(outbounds) => outbounds,
        Err(e) => {
            tracing::warn!(
                user_id = %conn.user_id,
                connection_id = %conn.id,
                event = name,
                error = %e,
                "Event handler failed"
            );
            vec![Outbound::sender(ServerEvent::error(&e))]
        }
    }
}

async fn route(state: &AppState, conn: &Connection, event: ClientEvent) -> CollabResult<Vec<Outbound>> {
    let now = Utc::now();
    let outbounds = match event {
        ClientEvent::JoinMatrix { matrix_id } => return join_matrix(state, conn, matrix_id).await,
        ClientEvent::LeaveMatrix { matrix_id } => leave_matrix(state, conn, matrix_id),
        ClientEvent::MatrixUpdate {
            matrix_id,
            changes,
            operation,
        } => {
            tracing::debug!(user_id = %conn.user_id, matrix_id = %matrix_id, "Relaying matrix update");
            vec![
                Outbound::room_peers(
                    &matrix_id,
                    ServerEvent::MatrixUpdated {
                        matrix_id: matrix_id.clone(),
                        changes,
                        operation,
                        updated_by: conn.presence_user(),
                        timestamp: now,
                    },
                ),
                Outbound::sender(ServerEvent::MatrixUpdateConfirmed {
                    matrix_id,
                    timestamp: now,
                }),
            ]
        }
        ClientEvent::CellEdit {
            matrix_id,
            row,
            col,
            value,
            is_editing,
        } => vec![Outbound::room_peers(
            &matrix_id.clone(),
            ServerEvent::CellBeingEdited {
                matrix_id,
                row,
                col,
                value,
                is_editing,
                editor: conn.presence_user(),
                timestamp: now,
            },
        )],
        ClientEvent::CursorPosition { matrix_id, row, col } => vec![Outbound::room_peers(
            &matrix_id.clone(),
            ServerEvent::UserCursor {
                matrix_id,
                row,
                col,
                user: conn.presence_user(),
                timestamp: now,
            },
        )],
        ClientEvent::TypingStart {
            matrix_id,
            comment_id,
        } => vec![Outbound::room_peers(
            &matrix_id.clone(),
            ServerEvent::UserTyping {
                matrix_id,
                comment_id,
                user: conn.presence_user(),
                timestamp: now,
            },
        )],
        ClientEvent::TypingStop {
            matrix_id,
            comment_id,
        } => vec![Outbound::room_peers(
            &matrix_id.clone(),
            ServerEvent::UserStoppedTyping {
                matrix_id,
                comment_id,
                user: conn.presence_user(),
                timestamp: now,
            },
        )],
        ClientEvent::NotificationRead { notification_id } => {
            let notifications = state.notifications.clone();
            let user_id = conn.user_id.clone();
            let id = notification_id.clone();
            tokio::task::spawn_blocking(move || notifications.mark_read(&id, &user_id)).await??;
            vec![Outbound::sender(ServerEvent::NotificationMarkedRead {
                notification_id,
                timestamp: now,
            })]
        }
        ClientEvent::Ping(_) => vec![Outbound::sender(ServerEvent::Pong { timestamp: now })],
    };
    Ok(outbounds)
}

async fn load_matrix(state: &AppState, matrix_id: &str) -> CollabResult<Matrix> {
    let store = state.store.clone();
    let id = matrix_id.to_string();
    tokio::task::spawn_blocking(move || store.get(&id)).await?
}

async fn join_matrix(
    state: &AppState,
    conn: &Connection,
    matrix_id: String,
) -> CollabResult<Vec<Outbound>> {
    let matrix = load_matrix(state, &matrix_id).await?;
    permissions::require(&matrix, &conn.user_id, Action::View)?;

    // Superseded while the matrix was loading
    if !state.connections.is_current(&conn.user_id, conn.id) {
        return Ok(Vec::new());
    }
    state.rooms.join(&matrix_id, conn);
    tracing::info!(
        user_id = %conn.user_id,
        matrix_id = %matrix_id,
        "Joined matrix room"
    );

    let now = Utc::now();
    Ok(vec![
        Outbound::room_peers(
            &matrix_id,
            ServerEvent::UserJoinedMatrix {
                matrix_id: matrix_id.clone(),
                user: conn.presence_user(),
                timestamp: now,
            },
        ),
        Outbound::sender(ServerEvent::JoinedMatrix {
            message: format!("Joined matrix \"{}\"", matrix.name),
            matrix_id,
            timestamp: now,
        }),
    ])
}

fn leave_matrix(state: &AppState, conn: &Connection, matrix_id: String) -> Vec<Outbound> {
    let now = Utc::now();
    let mut outbounds = Vec::with_capacity(2);
    if state.rooms.leave(&matrix_id, conn.id) {
        tracing::info!(
            user_id = %conn.user_id,
            matrix_id = %matrix_id,
            "Left matrix room"
        );
        outbounds.push(Outbound::room(
            &matrix_id,
            ServerEvent::UserLeftMatrix {
                matrix_id: matrix_id.clone(),
                user: conn.presence_user(),
                timestamp: now,
            },
        ));
    }
    outbounds.push(Outbound::sender(ServerEvent::LeftMatrix {
        matrix_id,
        timestamp: now,
    }));
    outbounds
}

/// Drop every room membership of `conn` and announce the departure to each room.
pub fn handle_departure(state: &AppState, conn: &Connection) -> Vec<Outbound> {
    let now = Utc::now();
    state
        .rooms
        .leave_all(conn.id)
        .into_iter()
        .map(|matrix_id| {
            Outbound::room(
                &matrix_id.clone(),
                ServerEvent::UserDisconnected {
                    matrix_id,
                    user: conn.presence_user(),
                    timestamp: now,
                },
            )
        })
        .collect()
}

/// Send each outbound event. Never blocks; every target is an unbounded channel.
pub fn deliver(state: &AppState, conn: &Connection, outbounds: Vec<Outbound>) {
    for outbound in outbounds {
        match outbound.target {
            Target::Sender => {
                conn.send(&outbound.event);
            }
            Target::Room {
                matrix_id,
                exclude_sender,
            } => {
                let exclude = if exclude_sender { Some(conn.id) } else { None };
                let sent = state.rooms.broadcast(&matrix_id, &outbound.event, exclude);
                tracing::debug!(matrix_id = %matrix_id, recipients = sent, "Room broadcast");
            }
        }
    }
}

/// Entry point for a text frame from `conn`.
///
/// Frames from a connection that has been superseded or evicted are dropped;
/// its socket is already closing.
pub async fn handle_text(state: &AppState, conn: &Connection, text: &str) {
    if !state.connections.touch_connection(&conn.user_id, conn.id) {
        tracing::debug!(
            user_id = %conn.user_id,
            connection_id = %conn.id,
            "Dropped frame from retired connection"
        );
        return;
    }

    let outbounds = match ClientEvent::parse(text) {
        Ok(event) => dispatch(state, conn, event).await,
        Err(e) => {
            tracing::debug!(user_id = %conn.user_id, error = %e, "Rejected malformed frame");
            vec![Outbound::sender(ServerEvent::error(&e))]
        }
    };
    deliver(state, conn, outbounds);
}
