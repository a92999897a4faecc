//! Realtime data service abstraction
//!
//! The room service keeps no state of its own: games, seated players,
//! activity events and profiles live in an external realtime database.
//! This module defines the contract for that database, a filter
//! language small enough to map onto any SQL-backed realtime service,
//! and a typed repository on top of it.

pub mod filter;
pub mod memory;
pub mod store;

pub use filter::{Condition, Filter, Order};
pub use memory::{InMemoryDataService, Operation};
pub use store::{GamePlayerRecord, GameRecord, PlayerEventRecord, ProfileRecord, RoomStore};

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_stream::{Stream, StreamExt};

/// A stored row, as a JSON object
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Named collections consumed by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Games,
    GamePlayers,
    GamePlayerEvents,
    Profiles,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Games => "games",
            Collection::GamePlayers => "game_players",
            Collection::GamePlayerEvents => "game_player_events",
            Collection::Profiles => "profiles",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of row change delivered by a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A change to one row
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub collection: Collection,
    pub kind: ChangeKind,
    /// Row after the change (absent for deletes)
    pub new: Option<Record>,
    /// Row before the change (absent for inserts)
    pub old: Option<Record>,
}

/// Cancellable stream of change events
///
/// Dropping the subscription releases the underlying channel.
pub struct Subscription {
    stream: Pin<Box<dyn Stream<Item = ChangeEvent> + Send>>,
}

impl Subscription {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = ChangeEvent> + Send + 'static,
    {
        Self {
            stream: Box::pin(stream),
        }
    }

    /// Next change, or `None` once the service closes the channel
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        self.stream.next().await
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

/// Contract of the external realtime data service
#[async_trait]
pub trait DataService: Send + Sync {
    /// Rows matching `filter`, honouring its ordering and limit
    async fn query(&self, collection: Collection, filter: Filter) -> Result<Vec<Record>>;

    /// Insert a row; returns the stored row (with a generated `id` if absent)
    async fn insert(&self, collection: Collection, record: Record) -> Result<Record>;

    /// Merge `patch` into every row matching `filter`; returns rows affected
    async fn update(&self, collection: Collection, filter: Filter, patch: Record) -> Result<usize>;

    /// Delete every row matching `filter`; returns rows affected
    async fn delete(&self, collection: Collection, filter: Filter) -> Result<usize>;

    /// Stream changes of the given kinds to rows matching `filter`
    async fn subscribe(
        &self,
        collection: Collection,
        filter: Filter,
        kinds: Vec<ChangeKind>,
    ) -> Result<Subscription>;
}
