use axum::{middleware, Router};

use crate::auth::middleware::AuthVerifier;
use crate::matrix::routes as matrix_routes;
use crate::presence;
use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Inject the credential verifier into request extensions so the AuthUser extractor can find it.
async fn inject_verifier(
    axum::extract::State(state): axum::extract::State<AppState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: middleware::Next,
) -> axum::response::Response {
    req.extensions_mut()
        .insert(AuthVerifier(state.verifier.clone()));
    next.run(req).await
}

/// Build the full axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    // Matrix CRUD, collaborators and algebra (bearer auth via AuthUser extractor)
    let matrix_routes = Router::new()
        .route("/api/matrices", axum::routing::post(matrix_routes::create_matrix))
        .route(
            "/api/matrices/{id}",
            axum::routing::get(matrix_routes::get_matrix).delete(matrix_routes::delete_matrix),
        )
        .route(
            "/api/matrices/{id}/data",
            axum::routing::put(matrix_routes::update_matrix_data),
        )
        .route(
            "/api/matrices/{id}/collaborators",
            axum::routing::post(matrix_routes::add_collaborator),
        )
        .route(
            "/api/matrices/{id}/collaborators/{user_id}",
            axum::routing::delete(matrix_routes::remove_collaborator),
        )
        .route(
            "/api/matrices/{id}/operations",
            axum::routing::post(matrix_routes::perform_operation)
                .get(matrix_routes::list_operations),
        );

    let presence_routes = Router::new().route(
        "/api/presence",
        axum::routing::get(presence::list_active_users),
    );

    // WebSocket endpoint (auth via query param or bearer header)
    let ws_routes = Router::new().route("/ws", axum::routing::get(ws_handler::ws_upgrade));

    // Health check
    let health = Router::new().route("/health", axum::routing::get(health_check));

    Router::new()
        .merge(matrix_routes)
        .merge(presence_routes)
        .merge(ws_routes)
        .merge(health)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            inject_verifier,
        ))
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
