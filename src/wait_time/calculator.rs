//! Matchmaking wait time heuristic
//!
//! Turns historical and live pool statistics into a predicted wait in
//! seconds. The calculation is a pure function of its inputs and the
//! local clock hour so it can be exercised without any I/O.

use crate::error::{Result, RoomError};
use crate::utils::round_to_step;
use serde::{Deserialize, Serialize};

/// Share of the historical average used as the starting estimate
pub const HISTORY_WEIGHT: f64 = 0.4;
/// Weight of the missing-players factor when the pool has activity
pub const PLAYER_FACTOR_WEIGHT: f64 = 0.3;
/// Floor for the missing-players factor
pub const MIN_PLAYER_FACTOR: f64 = 0.5;
/// Penalty applied when nobody is waiting in the pool
pub const EMPTY_POOL_MULTIPLIER: f64 = 1.3;
/// Penalty applied outside peak hours
pub const OFF_PEAK_MULTIPLIER: f64 = 1.15;
/// Weight of the wager factor
pub const WAGER_FACTOR_WEIGHT: f64 = 0.15;

/// Local clock hours with the most traffic
pub const PEAK_HOURS: [u32; 8] = [20, 21, 22, 23, 0, 1, 2, 3];

/// Configuration for wait time estimation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Lower bound of a published estimate
    pub min_wait_seconds: u32,
    /// Upper bound of a published estimate
    pub max_wait_seconds: u32,
    /// Estimates are rounded to a multiple of this
    pub rounding_step_seconds: u32,
    /// Starting point when there is no history
    pub base_wait_seconds: u32,
    /// Published when the data service cannot be read
    pub fallback_wait_seconds: u32,
    /// Seats to fill before a game starts (same for solo and partnered)
    pub players_needed: u32,
    /// How far back historical samples are considered
    pub time_window_hours: u32,
    /// How often a live estimate is recomputed
    pub refresh_interval_seconds: u64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            min_wait_seconds: 30,
            max_wait_seconds: 900, // 15 minutes
            rounding_step_seconds: 30,
            base_wait_seconds: 60,
            fallback_wait_seconds: 60,
            players_needed: 4,
            time_window_hours: 24,
            refresh_interval_seconds: 60,
        }
    }
}

impl EstimatorConfig {
    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.min_wait_seconds >= self.max_wait_seconds {
            return Err(RoomError::Configuration {
                message: "min_wait_seconds must be less than max_wait_seconds".to_string(),
            }
            .into());
        }

        if self.rounding_step_seconds == 0 {
            return Err(RoomError::Configuration {
                message: "rounding_step_seconds must be greater than 0".to_string(),
            }
            .into());
        }

        if self.min_wait_seconds % self.rounding_step_seconds != 0
            || self.max_wait_seconds % self.rounding_step_seconds != 0
        {
            return Err(RoomError::Configuration {
                message: "wait bounds must be multiples of rounding_step_seconds".to_string(),
            }
            .into());
        }

        if self.fallback_wait_seconds < self.min_wait_seconds
            || self.fallback_wait_seconds > self.max_wait_seconds
        {
            return Err(RoomError::Configuration {
                message: "fallback_wait_seconds must be within min/max bounds".to_string(),
            }
            .into());
        }

        if self.players_needed == 0 {
            return Err(RoomError::Configuration {
                message: "players_needed must be greater than 0".to_string(),
            }
            .into());
        }

        if self.time_window_hours == 0 {
            return Err(RoomError::Configuration {
                message: "time_window_hours must be greater than 0".to_string(),
            }
            .into());
        }

        if self.refresh_interval_seconds == 0 {
            return Err(RoomError::Configuration {
                message: "refresh_interval_seconds must be greater than 0".to_string(),
            }
            .into());
        }

        Ok(())
    }
}

/// Everything the heuristic looks at
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimateInputs {
    /// Mean seconds between creation and start of matched games (0 if none)
    pub average_wait_seconds: f64,
    /// Players currently sitting in open games of the pool
    pub active_players: u32,
    pub wager_amount: f64,
    /// Local clock hour, 0-23
    pub local_hour: u32,
}

pub fn is_peak_hour(hour: u32) -> bool {
    PEAK_HOURS.contains(&hour)
}

/// Estimate before clamping and rounding
pub fn raw_estimate(config: &EstimatorConfig, inputs: &EstimateInputs) -> f64 {
    let mut estimate = config.base_wait_seconds as f64;

    if inputs.average_wait_seconds > 0.0 {
        estimate = inputs.average_wait_seconds * HISTORY_WEIGHT;
    }

    if inputs.active_players > 0 {
        let needed = config.players_needed as f64;
        let player_factor = ((needed - inputs.active_players as f64) / needed).max(MIN_PLAYER_FACTOR);
        estimate += estimate * player_factor * PLAYER_FACTOR_WEIGHT;
    } else {
        estimate *= EMPTY_POOL_MULTIPLIER;
    }

    if !is_peak_hour(inputs.local_hour) {
        estimate *= OFF_PEAK_MULTIPLIER;
    }

    if inputs.wager_amount > 0.0 {
        let wager_factor = (inputs.wager_amount + 1.0).log10() / 2.0;
        estimate *= 1.0 + wager_factor * WAGER_FACTOR_WEIGHT;
    }

    estimate
}

/// Clamp to the configured bounds, then round to the nearest step
pub fn finalize_estimate(config: &EstimatorConfig, raw: f64) -> u32 {
    // f64::max/min map NaN to the bound
    let clamped = raw
        .max(config.min_wait_seconds as f64)
        .min(config.max_wait_seconds as f64);
    round_to_step(clamped, config.rounding_step_seconds as f64) as u32
}

/// Full heuristic: raw estimate, clamped and rounded
pub fn estimate_seconds(config: &EstimatorConfig, inputs: &EstimateInputs) -> u32 {
    finalize_estimate(config, raw_estimate(config, inputs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const OFF_PEAK_HOUR: u32 = 14;
    const PEAK_HOUR: u32 = 22;

    fn inputs(average: f64, active: u32, wager: f64, hour: u32) -> EstimateInputs {
        EstimateInputs {
            average_wait_seconds: average,
            active_players: active,
            wager_amount: wager,
            local_hour: hour,
        }
    }

    #[test]
    fn test_config_default_is_valid() {
        let config = EstimatorConfig::default();
        assert_eq!(config.min_wait_seconds, 30);
        assert_eq!(config.max_wait_seconds, 900);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = EstimatorConfig::default();
        config.min_wait_seconds = 900;
        assert!(config.validate().is_err());

        config = EstimatorConfig::default();
        config.rounding_step_seconds = 0;
        assert!(config.validate().is_err());

        config = EstimatorConfig::default();
        config.min_wait_seconds = 45; // not a multiple of the step
        assert!(config.validate().is_err());

        config = EstimatorConfig::default();
        config.fallback_wait_seconds = 10;
        assert!(config.validate().is_err());

        config = EstimatorConfig::default();
        config.refresh_interval_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_peak_hour_edges() {
        assert!(!is_peak_hour(19));
        assert!(is_peak_hour(20));
        assert!(is_peak_hour(3));
        assert!(!is_peak_hour(4));
    }

    #[test]
    fn test_empty_pool_off_peak_no_wager() {
        let config = EstimatorConfig::default();
        let raw = raw_estimate(&config, &inputs(0.0, 0, 0.0, OFF_PEAK_HOUR));
        assert!((raw - 89.7).abs() < 1e-9);
        assert_eq!(finalize_estimate(&config, raw), 90);
    }

    #[test]
    fn test_empty_pool_peak_no_wager() {
        let config = EstimatorConfig::default();
        let raw = raw_estimate(&config, &inputs(0.0, 0, 0.0, PEAK_HOUR));
        assert!((raw - 78.0).abs() < 1e-9);
        assert_eq!(finalize_estimate(&config, raw), 90);
    }

    #[test]
    fn test_wager_of_99_rounds_down() {
        let config = EstimatorConfig::default();
        let raw = raw_estimate(&config, &inputs(0.0, 0, 99.0, OFF_PEAK_HOUR));
        assert!((raw - 103.155).abs() < 1e-9);
        assert_eq!(finalize_estimate(&config, raw), 90);
    }

    #[test]
    fn test_zero_wager_has_no_effect() {
        let config = EstimatorConfig::default();
        let free = raw_estimate(&config, &inputs(300.0, 2, 0.0, PEAK_HOUR));
        let tiny = raw_estimate(&config, &inputs(300.0, 2, 0.000001, PEAK_HOUR));
        assert!((free - tiny).abs() < 1e-3);
    }

    #[test]
    fn test_history_and_active_players() {
        let config = EstimatorConfig::default();
        // 600 * 0.4 = 240; factor max(0.5, 3/4) = 0.75 -> 240 + 240*0.75*0.3 = 294
        let raw = raw_estimate(&config, &inputs(600.0, 1, 0.0, PEAK_HOUR));
        assert!((raw - 294.0).abs() < 1e-9);
        assert_eq!(finalize_estimate(&config, raw), 300);
    }

    #[test]
    fn test_player_factor_floor() {
        let config = EstimatorConfig::default();
        // More players than seats still uses the 0.5 floor
        let crowded = raw_estimate(&config, &inputs(600.0, 9, 0.0, PEAK_HOUR));
        assert!((crowded - 276.0).abs() < 1e-9);
    }

    #[test]
    fn test_huge_wager_is_clamped() {
        let config = EstimatorConfig::default();
        let seconds = estimate_seconds(&config, &inputs(100_000.0, 0, 1e300, OFF_PEAK_HOUR));
        assert_eq!(seconds, 900);
    }

    #[test]
    fn test_short_history_is_clamped_up() {
        let config = EstimatorConfig::default();
        let seconds = estimate_seconds(&config, &inputs(10.0, 3, 0.0, PEAK_HOUR));
        assert_eq!(seconds, 30);
    }

    proptest! {
        #[test]
        fn prop_estimate_within_bounds_and_on_step(
            average in 0.0f64..1_000_000.0,
            active in 0u32..64,
            wager in 0.0f64..1e12,
            hour in 0u32..24,
        ) {
            let config = EstimatorConfig::default();
            let seconds = estimate_seconds(&config, &inputs(average, active, wager, hour));
            prop_assert!((30..=900).contains(&seconds));
            prop_assert_eq!(seconds % 30, 0);
        }
    }
}
