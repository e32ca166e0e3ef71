use axum::{extract::State, Json};
use serde::Serialize;

use crate::auth::middleware::AuthUser;
use crate::state::AppState;
use crate::ws::ConnectionSummary;

#[derive(Debug, Serialize)]
pub struct PresenceResponse {
    pub count: usize,
    pub users: Vec<ConnectionSummary>,
}

/// GET /api/presence: users with a live connection and the rooms they are in.
pub async fn list_active_users(
    State(state): State<AppState>,
    _user: AuthUser,
) -> Json<PresenceResponse> {
    let users = state.connections.list(&state.rooms);
    Json(PresenceResponse {
        count: users.len(),
        users,
    })
}
