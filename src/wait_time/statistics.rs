//! Pool statistics for wait time estimation
//!
//! Reduces raw matchmaking samples to the two numbers the heuristic
//! needs: how long matched games waited, and how many players are
//! sitting in open games right now.

use crate::types::MatchmakingSample;
use serde::{Deserialize, Serialize};

/// Summary of a matchmaking pool
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolStatistics {
    /// Number of historical games that matched
    pub matched_games: usize,
    /// Mean seconds from creation to start over matched games
    pub average_wait_seconds: f64,
    /// Number of games currently waiting
    pub open_games: usize,
    /// Sum of seated players over open games
    pub active_players: u32,
}

impl PoolStatistics {
    /// Summarize historical and current samples
    ///
    /// Historical samples without a start time never matched and are
    /// ignored.
    pub fn from_samples(historical: &[MatchmakingSample], current: &[MatchmakingSample]) -> Self {
        let waits: Vec<f64> = historical
            .iter()
            .filter_map(|sample| {
                sample.started_at.map(|started_at| {
                    started_at
                        .signed_duration_since(sample.created_at)
                        .num_milliseconds() as f64
                        / 1000.0
                })
            })
            .collect();

        let average_wait_seconds = if waits.is_empty() {
            0.0
        } else {
            waits.iter().sum::<f64>() / waits.len() as f64
        };

        Self {
            matched_games: waits.len(),
            average_wait_seconds,
            open_games: current.len(),
            active_players: current.iter().map(|sample| sample.players_count).sum(),
        }
    }
}
