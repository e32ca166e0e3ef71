use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;

use super::model::{Dimensions, Grid, Matrix, OperationRecord, Role};
use super::operations;
use super::permissions::{self, Action};
use super::store::NewMatrix;
use crate::auth::middleware::AuthUser;
use crate::db::users;
use crate::error::{CollabError, CollabResult};
use crate::notifications::NewNotification;
use crate::state::AppState;
use crate::ws::protocol::ServerEvent;

// --- Request types ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMatrixRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub rows: usize,
    pub columns: usize,
    /// Zero-filled when absent.
    #[serde(default)]
    pub data: Option<Grid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDataRequest {
    pub data: Grid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCollaboratorRequest {
    pub user_id: String,
    pub role: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRequest {
    pub operation_type: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

/// Run synchronous store work on the blocking pool.
async fn blocking<T, F>(f: F) -> CollabResult<T>
where
    F: FnOnce() -> CollabResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

async fn load(state: &AppState, matrix_id: &str) -> CollabResult<Matrix> {
    let store = state.store.clone();
    let id = matrix_id.to_string();
    blocking(move || store.get(&id)).await
}

// --- Handlers ---

/// POST /api/matrices: Create a matrix owned by the caller.
pub async fn create_matrix(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateMatrixRequest>,
) -> CollabResult<(StatusCode, Json<Matrix>)> {
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(CollabError::InvalidInput("Matrix name is required".to_string()));
    }
    let dimensions = Dimensions {
        rows: req.rows,
        columns: req.columns,
    };
    dimensions.check_bounds()?;
    let data = req.data.unwrap_or_else(|| dimensions.zeros());
    dimensions.validate(&data)?;

    let store = state.store.clone();
    let new = NewMatrix {
        name,
        description: req.description,
        owner_id: user.user_id.clone(),
        dimensions,
        data,
    };
    let matrix = blocking(move || store.create(new)).await?;

    tracing::info!(
        matrix_id = %matrix.id,
        owner_id = %user.user_id,
        rows = matrix.dimensions.rows,
        columns = matrix.dimensions.columns,
        "Matrix created"
    );
    Ok((StatusCode::CREATED, Json(matrix)))
}

/// GET /api/matrices/{id}
pub async fn get_matrix(
    State(state): State<AppState>,
    user: AuthUser,
    Path(matrix_id): Path<String>,
) -> CollabResult<Json<Matrix>> {
    let matrix = load(&state, &matrix_id).await?;
    permissions::require(&matrix, &user.user_id, Action::View)?;
    Ok(Json(matrix))
}

/// PUT /api/matrices/{id}/data: Replace the grid. Shape must match the stored dimensions.
pub async fn update_matrix_data(
    State(state): State<AppState>,
    user: AuthUser,
    Path(matrix_id): Path<String>,
    Json(req): Json<UpdateDataRequest>,
) -> CollabResult<Json<Matrix>> {
    let matrix = load(&state, &matrix_id).await?;
    permissions::require(&matrix, &user.user_id, Action::Edit)?;
    matrix.dimensions.validate(&req.data)?;

    let store = state.store.clone();
    let id = matrix_id.clone();
    let updated = blocking(move || store.update_data(&id, req.data)).await?;

    tracing::info!(
        matrix_id = %matrix_id,
        user_id = %user.user_id,
        modification_count = updated.modification_count,
        "Matrix data updated"
    );
    Ok(Json(updated))
}

/// DELETE /api/matrices/{id}: Owner only. Soft delete.
pub async fn delete_matrix(
    State(state): State<AppState>,
    user: AuthUser,
    Path(matrix_id): Path<String>,
) -> CollabResult<StatusCode> {
    let matrix = load(&state, &matrix_id).await?;
    permissions::require_owner(&matrix, &user.user_id, "delete this matrix")?;

    let store = state.store.clone();
    let id = matrix_id.clone();
    blocking(move || store.soft_delete(&id)).await?;

    tracing::info!(matrix_id = %matrix_id, user_id = %user.user_id, "Matrix deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/matrices/{id}/collaborators: Grant or change a collaborator's role.
///
/// Requires admin. The added user gets a `collaborator_added` notification,
/// pushed live if they are connected.
pub async fn add_collaborator(
    State(state): State<AppState>,
    user: AuthUser,
    Path(matrix_id): Path<String>,
    Json(req): Json<AddCollaboratorRequest>,
) -> CollabResult<Json<Matrix>> {
    let mut matrix = load(&state, &matrix_id).await?;
    permissions::require(&matrix, &user.user_id, Action::Admin)?;

    let role = Role::parse(&req.role)
        .ok_or_else(|| CollabError::InvalidInput(format!("Unknown role '{}'", req.role)))?;

    let db = state.db.clone();
    let target_id = req.user_id.clone();
    let target = blocking(move || users::find_user(&db, &target_id))
        .await?
        .ok_or_else(|| CollabError::NotFound("User".to_string()))?;

    matrix.add_collaborator(&target.id, role)?;

    let store = state.store.clone();
    let id = matrix_id.clone();
    let target_id = target.id.clone();
    blocking(move || store.upsert_collaborator(&id, &target_id, role)).await?;

    let notifications = state.notifications.clone();
    let new = NewNotification {
        recipient_id: target.id.clone(),
        kind: "collaborator_added".to_string(),
        title: "Matrix Shared with You".to_string(),
        message: format!(
            "{} shared \"{}\" with you as {}",
            user.username,
            matrix.name,
            role.as_str()
        ),
        matrix_id: Some(matrix_id.clone()),
    };
    let notification = blocking(move || notifications.create(new)).await?;
    let delivered = state
        .connections
        .send_to_user(&target.id, &ServerEvent::NewNotification { notification });

    tracing::info!(
        matrix_id = %matrix_id,
        collaborator = %target.id,
        role = role.as_str(),
        delivered,
        "Collaborator added"
    );
    Ok(Json(matrix))
}

/// DELETE /api/matrices/{id}/collaborators/{user_id}: Owner only.
pub async fn remove_collaborator(
    State(state): State<AppState>,
    user: AuthUser,
    Path((matrix_id, collaborator_id)): Path<(String, String)>,
) -> CollabResult<StatusCode> {
    let mut matrix = load(&state, &matrix_id).await?;
    permissions::require_owner(&matrix, &user.user_id, "remove collaborators")?;
    if !matrix.remove_collaborator(&collaborator_id) {
        return Err(CollabError::NotFound("Collaborator".to_string()));
    }

    let store = state.store.clone();
    let id = matrix_id.clone();
    let target = collaborator_id.clone();
    let removed = blocking(move || store.remove_collaborator(&id, &target)).await?;
    if !removed {
        return Err(CollabError::NotFound("Collaborator".to_string()));
    }

    tracing::info!(matrix_id = %matrix_id, collaborator = %collaborator_id, "Collaborator removed");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/matrices/{id}/operations: Run an algebra operation.
///
/// The record is appended to the history and announced to the matrix room.
pub async fn perform_operation(
    State(state): State<AppState>,
    user: AuthUser,
    Path(matrix_id): Path<String>,
    Json(req): Json<OperationRequest>,
) -> CollabResult<Json<OperationRecord>> {
    let record = operations::perform_operation(
        state.store.clone(),
        &matrix_id,
        &user.user_id,
        &req.operation_type,
        req.parameters,
        state.algebra.max_determinant_dimension,
    )
    .await?;

    state.rooms.broadcast(
        &matrix_id,
        &ServerEvent::MatrixNotification {
            matrix_id: matrix_id.clone(),
            operation: record.clone(),
            timestamp: Utc::now(),
        },
        None,
    );

    Ok(Json(record))
}

/// GET /api/matrices/{id}/operations: History in insertion order.
pub async fn list_operations(
    State(state): State<AppState>,
    user: AuthUser,
    Path(matrix_id): Path<String>,
) -> CollabResult<Json<Vec<OperationRecord>>> {
    let matrix = load(&state, &matrix_id).await?;
    permissions::require(&matrix, &user.user_id, Action::View)?;

    let store = state.store.clone();
    let records = blocking(move || store.operations(&matrix_id)).await?;
    Ok(Json(records))
}
