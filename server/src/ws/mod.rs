pub mod actor;
pub mod broadcast;
pub mod handler;
pub mod protocol;
pub mod reaper;
pub mod registry;
pub mod rooms;
pub mod router;

use tokio::sync::mpsc;

/// Sender half of a WebSocket connection's outbound channel.
/// Unbounded so fan-out never waits on a slow recipient.
pub type ConnectionSender = mpsc::UnboundedSender<axum::extract::ws::Message>;

pub use registry::{Connection, ConnectionRegistry, ConnectionSummary};
pub use rooms::RoomManager;

/// Close code sent when the bearer credential is missing, invalid or inactive.
pub const CLOSE_AUTH_FAILED: u16 = 4001;
/// Close code sent to a connection replaced by a newer login of the same user.
pub const CLOSE_SUPERSEDED: u16 = 4005;
/// Close code sent when the idle reaper evicts a connection.
pub const CLOSE_IDLE: u16 = 4008;
