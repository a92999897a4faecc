//! Configuration management for the spades-room service
//!
//! This module handles configuration loading from environment variables
//! and TOML files, validation, and default values.

pub mod app;
pub mod room;

// Re-export commonly used types
pub use app::{validate_config, AppConfig, ServiceSettings};
pub use room::RoomConfig;
