use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocketUpgrade},
        Query, State,
    },
    http::{header::AUTHORIZATION, HeaderMap},
    response::Response,
};
use serde::Deserialize;

use crate::auth::middleware::bearer_token;
use crate::auth::verifier::authenticate;
use crate::auth::VerifiedUser;
use crate::error::{CollabError, CollabResult};
use crate::state::AppState;
use crate::ws::{actor, CLOSE_AUTH_FAILED};

/// Query parameters for WebSocket connection.
/// Browsers cannot set headers on a WebSocket handshake, so `?token=` is accepted
/// alongside `Authorization: Bearer`.
#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: Option<String>,
}

/// GET /ws?token=JWT
/// WebSocket upgrade endpoint. On auth failure, upgrades then immediately closes
/// with 4001. On success, hands the socket to a connection actor.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsAuthQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let token = params.token.filter(|t| !t.is_empty()).or_else(|| {
        headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token)
            .map(str::to_string)
    });

    match verify(&state, token).await {
        Ok(user) => {
            tracing::info!(
                user_id = %user.user_id,
                username = %user.username,
                "WebSocket connection authenticated"
            );
            ws.on_upgrade(move |socket| actor::run_connection(socket, state, user))
        }
        Err(err) => {
            let reason = err.to_string();
            tracing::warn!(
                close_code = CLOSE_AUTH_FAILED,
                reason = %reason,
                "WebSocket auth failed"
            );

            ws.on_upgrade(move |mut socket| async move {
                let close_frame = CloseFrame {
                    code: CLOSE_AUTH_FAILED,
                    reason: reason.into(),
                };
                let _ = socket.send(Message::Close(Some(close_frame))).await;
            })
        }
    }
}

async fn verify(state: &AppState, token: Option<String>) -> CollabResult<VerifiedUser> {
    let token = token
        .ok_or_else(|| CollabError::AuthenticationFailed("No token provided".to_string()))?;
    let verifier = state.verifier.clone();
    tokio::task::spawn_blocking(move || authenticate(verifier.as_ref(), &token)).await?
}
