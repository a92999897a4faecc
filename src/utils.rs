//! Utility functions for the room service

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generate a new unique room ID
pub fn generate_room_id() -> Uuid {
    Uuid::new_v4()
}

/// Generate a new unique record ID
pub fn generate_record_id() -> Uuid {
    Uuid::new_v4()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Render a number of seconds as `MM:SS`
pub fn format_mm_ss(total_seconds: u32) -> String {
    format!("{:02}:{:02}", total_seconds / 60, total_seconds % 60)
}

/// Round to the nearest multiple of `step` (half away from zero)
pub fn round_to_step(value: f64, step: f64) -> f64 {
    (value / step).round() * step
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_unique_ids() {
        assert_ne!(generate_room_id(), generate_room_id());
        assert_ne!(generate_record_id(), generate_record_id());
    }

    #[test]
    fn test_format_mm_ss() {
        assert_eq!(format_mm_ss(0), "00:00");
        assert_eq!(format_mm_ss(90), "01:30");
        assert_eq!(format_mm_ss(900), "15:00");
    }

    #[test]
    fn test_round_to_step() {
        assert_eq!(round_to_step(89.7, 30.0), 90.0);
        assert_eq!(round_to_step(103.155, 30.0), 90.0);
        assert_eq!(round_to_step(105.0, 30.0), 120.0);
    }
}
