use axum::extract::ws::{CloseFrame, Message, WebSocket};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};

use crate::auth::VerifiedUser;
use crate::error::CollabError;
use crate::state::AppState;
use crate::ws::protocol::ServerEvent;
use crate::ws::registry::Connection;
use crate::ws::{router, CLOSE_SUPERSEDED};

/// Run the actor-per-connection pattern for an authenticated WebSocket.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards messages from an mpsc channel
/// - Ping task: heartbeat, closes the socket when a pong is missed
/// - Reader loop: feeds text frames through the event router
///
/// Every other part of the system reaches this client through clones of the
/// mpsc sender held in the registry and in room memberships.
pub async fn run_connection(socket: WebSocket, state: AppState, user: VerifiedUser) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    let conn = Connection::new(&user.user_id, &user.username, tx.clone())
        .with_full_name(&user.full_name);
    admit(&state, &conn);

    conn.send(&ServerEvent::Connected {
        user_id: conn.user_id.clone(),
        message: "Connected to matrix collaboration server".to_string(),
        timestamp: Utc::now(),
    });

    tracing::info!(
        user_id = %conn.user_id,
        connection_id = %conn.id,
        "WebSocket actor started"
    );

    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();

    let ping_interval = Duration::from_secs(state.presence.heartbeat_interval_secs);
    let pong_timeout = Duration::from_secs(state.presence.heartbeat_timeout_secs);
    let ping_tx = tx.clone();
    let ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(ping_interval);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            if ping_tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
                break;
            }

            match timeout(pong_timeout, pong_rx.recv()).await {
                Ok(Some(())) => {}
                _ => {
                    tracing::warn!("Pong timeout, closing connection");
                    let _ = ping_tx.send(Message::Close(Some(CloseFrame {
                        code: 1001,
                        reason: "Pong timeout".into(),
                    })));
                    break;
                }
            }
        }
    });

    loop {
        match ws_receiver.next().await {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    router::handle_text(&state, &conn, text.as_str()).await;
                }
                Message::Binary(_) => {
                    conn.send(&ServerEvent::error(&CollabError::InvalidInput(
                        "Binary frames are not supported".to_string(),
                    )));
                }
                Message::Pong(_) => {
                    // Heartbeat only; does not count as activity
                    let _ = pong_tx.send(());
                }
                Message::Ping(data) => {
                    let _ = tx.send(Message::Pong(data));
                }
                Message::Close(frame) => {
                    tracing::info!(
                        user_id = %conn.user_id,
                        reason = ?frame,
                        "Client initiated close"
                    );
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(
                    user_id = %conn.user_id,
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
            None => {
                tracing::info!(user_id = %conn.user_id, "WebSocket stream ended");
                break;
            }
        }
    }

    writer_handle.abort();
    ping_handle.abort();

    // Rooms first, then the registry entry
    let outbounds = router::handle_departure(&state, &conn);
    router::deliver(&state, &conn, outbounds);
    state.connections.remove_connection(&conn.user_id, conn.id);

    tracing::info!(
        user_id = %conn.user_id,
        connection_id = %conn.id,
        "WebSocket actor stopped"
    );
}

/// Register `conn`, tearing down any connection it supersedes.
pub fn admit(state: &AppState, conn: &Connection) {
    let Some(previous) = state.connections.admit(conn.clone()) else {
        return;
    };

    let outbounds = router::handle_departure(state, &previous);
    router::deliver(state, &previous, outbounds);
    previous.close(CLOSE_SUPERSEDED, "Superseded by a newer connection");

    tracing::info!(
        user_id = %conn.user_id,
        superseded = %previous.id,
        connection_id = %conn.id,
        "Previous connection superseded"
    );
}

/// Writer task: receives messages from mpsc channel and forwards them to the WebSocket sink.
/// Stops after forwarding a close frame.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        let closing = matches!(msg, Message::Close(_));
        if ws_sender.send(msg).await.is_err() || closing {
            break;
        }
    }
}
