//! Matchmaking wait time estimation
//!
//! Predicts how long a player will wait for a Spades game in a given
//! (game type, wager) pool from recent matched games, the players sitting
//! in open games, the local hour and the wager size.

pub mod calculator;
pub mod clock;
pub mod provider;
pub mod statistics;

// Re-export commonly used types
pub use calculator::{estimate_seconds, EstimateInputs, EstimatorConfig};
pub use clock::{Clock, FixedClock, SystemClock};
pub use provider::{WaitTimeEstimator, WaitTimeProvider, WaitTimeRequest};
pub use statistics::PoolStatistics;
