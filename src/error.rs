//! Error types for the room service
//!
//! This module defines all error types using anyhow for consistent error handling
//! throughout the application.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific room and estimator scenarios
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    #[error("Data service request failed: {message}")]
    DataService { message: String },

    #[error("Room not found: {room_id}")]
    RoomNotFound { room_id: String },

    #[error("Player {user_id} is not seated in room {room_id}")]
    NotJoined { room_id: String, user_id: String },

    #[error("Only the host can start the game")]
    NotHost,

    #[error("All players must be ready before starting")]
    PlayersNotReady,

    #[error("Room {room_id} could not be started: {reason}")]
    StartConflict { room_id: String, reason: String },

    #[error("Invalid room transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Invalid record in {collection}: {reason}")]
    InvalidRecord { collection: String, reason: String },

    #[error("Room coordinator channel closed")]
    ChannelClosed,

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl RoomError {
    /// Whether this error is a precondition violation rather than a
    /// service failure
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            RoomError::NotHost
                | RoomError::PlayersNotReady
                | RoomError::NotJoined { .. }
                | RoomError::RoomNotFound { .. }
        )
    }
}
