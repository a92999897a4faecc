//! Spades Room - matchmaking wait estimates and waiting-room presence
//!
//! This crate predicts how long a player will wait for a Spades game in a
//! given pool and coordinates membership, ready state, host-only start and
//! the activity feed of a waiting room, on top of a realtime data service.

pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod room;
pub mod simulation;
pub mod types;
pub mod utils;
pub mod wait_time;

// Re-export commonly used types and traits
pub use error::{Result, RoomError};
pub use types::*;

// Re-export key components
pub use data::{DataService, InMemoryDataService, RoomStore};
pub use room::{Notifier, RoomPresenceCoordinator};
pub use wait_time::{WaitTimeEstimator, WaitTimeProvider};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
