//! Waiting-room configuration

use crate::error::{Result, RoomError};
use serde::{Deserialize, Serialize};

/// Settings for a room presence coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Most recent events loaded when the activity feed is mounted
    pub activity_seed_limit: usize,
    /// Entries returned by `recent` for display
    pub activity_display_limit: usize,
    /// Capacity of the coordinator's command queue
    pub command_buffer: usize,
    /// Phase recorded when the host starts the game
    pub start_phase: String,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            activity_seed_limit: 20,
            activity_display_limit: 50,
            command_buffer: 32,
            start_phase: "bidding".to_string(),
        }
    }
}

impl RoomConfig {
    pub fn validate(&self) -> Result<()> {
        if self.activity_seed_limit == 0 {
            return Err(RoomError::Configuration {
                message: "activity_seed_limit must be greater than 0".to_string(),
            }
            .into());
        }

        if self.activity_display_limit == 0 {
            return Err(RoomError::Configuration {
                message: "activity_display_limit must be greater than 0".to_string(),
            }
            .into());
        }

        if self.command_buffer == 0 {
            return Err(RoomError::Configuration {
                message: "command_buffer must be greater than 0".to_string(),
            }
            .into());
        }

        if self.start_phase.trim().is_empty() {
            return Err(RoomError::Configuration {
                message: "start_phase cannot be empty".to_string(),
            }
            .into());
        }

        Ok(())
    }
}
