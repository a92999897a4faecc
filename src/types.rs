//! Common types used throughout the room service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of an authenticated user (owned by the external auth service)
pub type UserId = String;

/// Unique identifier for rooms (one `games` row per room)
pub type RoomId = Uuid;

/// Unique identifier for activity events
pub type EventId = Uuid;

/// Table format a player queues for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameType {
    Solo,
    Partnered,
}

impl GameType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameType::Solo => "solo",
            GameType::Partnered => "partnered",
        }
    }
}

impl std::fmt::Display for GameType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "solo" => Ok(GameType::Solo),
            "partnered" | "partners" => Ok(GameType::Partnered),
            other => Err(anyhow::anyhow!("Unknown game type: {}", other)),
        }
    }
}

/// Free (bot-filled) or wagered matchmaking pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    Practice,
    Real,
}

impl GameMode {
    /// Pool implied by a wager amount
    pub fn for_wager(wager_amount: f64) -> Self {
        if wager_amount > 0.0 {
            GameMode::Real
        } else {
            GameMode::Practice
        }
    }
}

/// Lifecycle of a room; only ever moves forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Setup,
    Waiting,
    Starting,
    InProgress,
}

impl GameStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameStatus::Setup => "setup",
            GameStatus::Waiting => "waiting",
            GameStatus::Starting => "starting",
            GameStatus::InProgress => "in_progress",
        }
    }

    /// Statuses from which a game may still be started
    pub fn pre_game() -> [GameStatus; 3] {
        [GameStatus::Setup, GameStatus::Waiting, GameStatus::Starting]
    }
}

impl std::fmt::Display for GameStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Seat label at a four-handed Spades table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Seat {
    North,
    East,
    South,
    West,
}

impl Seat {
    /// Seats in the order they are handed out
    pub const ALL: [Seat; 4] = [Seat::North, Seat::East, Seat::South, Seat::West];
}

/// Kind of entry in a room's activity feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Join,
    Leave,
    Ready,
    Unready,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::Join => "join",
            ActivityKind::Leave => "leave",
            ActivityKind::Ready => "ready",
            ActivityKind::Unready => "unready",
        }
    }

    pub fn for_ready(is_ready: bool) -> Self {
        if is_ready {
            ActivityKind::Ready
        } else {
            ActivityKind::Unready
        }
    }
}

/// A player seated in a waiting room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomPlayer {
    pub id: UserId,
    pub name: String,
    pub avatar: Option<String>,
    pub is_ready: bool,
    pub is_host: bool,
    pub position: Option<Seat>,
}

/// One entry of the room activity feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerActivityEvent {
    pub id: EventId,
    pub kind: ActivityKind,
    pub player_name: String,
    pub timestamp: DateTime<Utc>,
}

/// Authoritative snapshot of a waiting room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomState {
    pub id: RoomId,
    pub status: GameStatus,
    pub players: Vec<RoomPlayer>,
    pub game_mode: GameMode,
    pub game_type: GameType,
    pub wager_amount: Option<f64>,
    pub host_id: Option<UserId>,
    pub current_phase: Option<String>,
}

/// Historical or currently-open game used by the wait time estimator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchmakingSample {
    pub created_at: DateTime<Utc>,
    /// `None` means the game never matched
    pub started_at: Option<DateTime<Utc>>,
    pub players_count: u32,
}

/// Predicted matchmaking wait for a (game type, wager) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitTimeEstimate {
    pub game_type: GameType,
    pub wager_amount: f64,
    pub estimated_seconds: u32,
    /// `MM:SS` rendering of `estimated_seconds`
    pub formatted: String,
    pub is_loading: bool,
}
