use std::sync::Arc;

use crate::auth::{CredentialVerifier, JwtCredentialVerifier};
use crate::config::{AlgebraConfig, PresenceConfig};
use crate::db::DbPool;
use crate::matrix::store::{MatrixStore, SqliteMatrixStore};
use crate::notifications::{NotificationService, SqliteNotificationService};
use crate::ws::{ConnectionRegistry, RoomManager};

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// SQLite connection wrapped in Arc<Mutex>
    pub db: DbPool,
    /// Live WebSocket connection per user
    pub connections: ConnectionRegistry,
    /// Matrix rooms and their member connections
    pub rooms: RoomManager,
    pub store: Arc<dyn MatrixStore>,
    pub notifications: Arc<dyn NotificationService>,
    pub verifier: Arc<dyn CredentialVerifier>,
    pub presence: PresenceConfig,
    pub algebra: AlgebraConfig,
}

impl AppState {
    /// SQLite-backed state with JWT credential verification.
    pub fn new(
        db: DbPool,
        jwt_secret: Vec<u8>,
        presence: PresenceConfig,
        algebra: AlgebraConfig,
    ) -> Self {
        Self {
            connections: ConnectionRegistry::new(),
            rooms: RoomManager::new(),
            store: Arc::new(SqliteMatrixStore::new(db.clone())),
            notifications: Arc::new(SqliteNotificationService::new(db.clone())),
            verifier: Arc::new(JwtCredentialVerifier::new(jwt_secret, db.clone())),
            db,
            presence,
            algebra,
        }
    }
}
