//! Typed repository over the data service
//!
//! Maps the four collections onto serde records and exposes the
//! queries the estimator and the room coordinator need.

use crate::data::{ChangeKind, Collection, DataService, Filter, Order, Record, Subscription};
use crate::error::{Result, RoomError};
use crate::types::{
    ActivityKind, GameMode, GameStatus, GameType, MatchmakingSample, PlayerActivityEvent,
    RoomId, RoomPlayer, RoomState, Seat, UserId,
};
use crate::utils::{current_timestamp, generate_record_id, generate_room_id};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Name shown when a player has no profile
pub const UNKNOWN_PLAYER_NAME: &str = "Unknown Player";

const SYNC_COUNT_ATTEMPTS: usize = 3;

/// Row of the `games` collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    pub id: RoomId,
    pub status: GameStatus,
    pub game_mode: GameMode,
    pub game_type: GameType,
    pub wager_amount: f64,
    pub host_id: Option<UserId>,
    pub players_count: u32,
    pub current_phase: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
}

impl GameRecord {
    /// A fresh room waiting for players
    pub fn waiting(game_type: GameType, wager_amount: f64, host_id: Option<UserId>) -> Self {
        Self {
            id: generate_room_id(),
            status: GameStatus::Waiting,
            game_mode: GameMode::for_wager(wager_amount),
            game_type,
            wager_amount,
            host_id,
            players_count: 0,
            current_phase: None,
            created_at: current_timestamp(),
            started_at: None,
        }
    }
}

/// Row of the `game_players` collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GamePlayerRecord {
    pub id: Uuid,
    pub game_id: RoomId,
    pub user_id: UserId,
    pub is_ready: bool,
    pub position: Option<Seat>,
    pub joined_at: DateTime<Utc>,
}

/// Row of the `game_player_events` collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerEventRecord {
    pub id: Uuid,
    pub game_id: RoomId,
    pub user_id: UserId,
    pub event_type: ActivityKind,
    pub player_name: String,
    pub created_at: DateTime<Utc>,
}

impl From<PlayerEventRecord> for PlayerActivityEvent {
    fn from(record: PlayerEventRecord) -> Self {
        Self {
            id: record.id,
            kind: record.event_type,
            player_name: record.player_name,
            timestamp: record.created_at,
        }
    }
}

/// Row of the `profiles` collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub id: UserId,
    pub username: Option<String>,
    pub avatar_url: Option<String>,
}

fn to_record<T: Serialize>(collection: Collection, value: &T) -> Result<Record> {
    match serde_json::to_value(value) {
        Ok(Value::Object(record)) => Ok(record),
        Ok(_) => Err(RoomError::InvalidRecord {
            collection: collection.to_string(),
            reason: "record did not serialize to an object".to_string(),
        }
        .into()),
        Err(e) => Err(RoomError::InvalidRecord {
            collection: collection.to_string(),
            reason: e.to_string(),
        }
        .into()),
    }
}

fn from_record<T: DeserializeOwned>(collection: Collection, record: Record) -> Result<T> {
    serde_json::from_value(Value::Object(record)).map_err(|e| {
        RoomError::InvalidRecord {
            collection: collection.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

fn from_records<T: DeserializeOwned>(collection: Collection, records: Vec<Record>) -> Result<Vec<T>> {
    records
        .into_iter()
        .map(|record| from_record(collection, record))
        .collect()
}

fn patch(value: Value) -> Record {
    match value {
        Value::Object(record) => record,
        _ => Record::new(),
    }
}

/// Typed access to games, seats, activity events and profiles
#[derive(Clone)]
pub struct RoomStore {
    service: Arc<dyn DataService>,
}

impl RoomStore {
    pub fn new(service: Arc<dyn DataService>) -> Self {
        Self { service }
    }

    /// The underlying data service
    pub fn service(&self) -> Arc<dyn DataService> {
        Arc::clone(&self.service)
    }

    fn pool_filter(game_type: GameType, wager_amount: f64) -> Filter {
        Filter::new()
            .eq("game_type", game_type.as_str())
            .eq("wager_amount", wager_amount)
    }

    /// Games in the pool created since `since` that actually started
    pub async fn matched_games(
        &self,
        game_type: GameType,
        wager_amount: f64,
        since: DateTime<Utc>,
    ) -> Result<Vec<MatchmakingSample>> {
        let filter = Self::pool_filter(game_type, wager_amount)
            .gte("created_at", since.to_rfc3339())
            .not_null("started_at");
        let games: Vec<GameRecord> =
            from_records(Collection::Games, self.service.query(Collection::Games, filter).await?)?;

        Ok(games.into_iter().map(sample_from_game).collect())
    }

    /// Games in the pool still waiting for players
    pub async fn open_games(
        &self,
        game_type: GameType,
        wager_amount: f64,
    ) -> Result<Vec<MatchmakingSample>> {
        let filter =
            Self::pool_filter(game_type, wager_amount).eq("status", GameStatus::Waiting.as_str());
        let games: Vec<GameRecord> =
            from_records(Collection::Games, self.service.query(Collection::Games, filter).await?)?;

        Ok(games.into_iter().map(sample_from_game).collect())
    }

    /// Insert a `games` row
    pub async fn create_game(&self, game: &GameRecord) -> Result<GameRecord> {
        let stored = self
            .service
            .insert(Collection::Games, to_record(Collection::Games, game)?)
            .await?;
        from_record(Collection::Games, stored)
    }

    pub async fn game(&self, room_id: RoomId) -> Result<Option<GameRecord>> {
        let rows = self
            .service
            .query(
                Collection::Games,
                Filter::new().eq("id", room_id.to_string()).limit(1),
            )
            .await?;
        rows.into_iter()
            .next()
            .map(|record| from_record(Collection::Games, record))
            .transpose()
    }

    /// Seated players in join order
    pub async fn players(&self, room_id: RoomId) -> Result<Vec<GamePlayerRecord>> {
        let rows = self
            .service
            .query(
                Collection::GamePlayers,
                Filter::new()
                    .eq("game_id", room_id.to_string())
                    .order_by("joined_at", Order::Asc),
            )
            .await?;
        from_records(Collection::GamePlayers, rows)
    }

    /// Seat a player
    pub async fn insert_player(
        &self,
        room_id: RoomId,
        user_id: &str,
        position: Option<Seat>,
    ) -> Result<GamePlayerRecord> {
        let record = GamePlayerRecord {
            id: generate_record_id(),
            game_id: room_id,
            user_id: user_id.to_string(),
            is_ready: false,
            position,
            joined_at: current_timestamp(),
        };
        let stored = self
            .service
            .insert(
                Collection::GamePlayers,
                to_record(Collection::GamePlayers, &record)?,
            )
            .await?;
        from_record(Collection::GamePlayers, stored)
    }

    fn own_seat_filter(room_id: RoomId, user_id: &str) -> Filter {
        Filter::new()
            .eq("game_id", room_id.to_string())
            .eq("user_id", user_id)
    }

    /// Remove the caller's seat; returns rows removed
    pub async fn delete_player(&self, room_id: RoomId, user_id: &str) -> Result<usize> {
        self.service
            .delete(Collection::GamePlayers, Self::own_seat_filter(room_id, user_id))
            .await
    }

    /// Remove one seat row by id; returns rows removed
    pub async fn remove_seat(&self, seat_id: Uuid) -> Result<usize> {
        self.service
            .delete(
                Collection::GamePlayers,
                Filter::new().eq("id", seat_id.to_string()),
            )
            .await
    }

    /// Write the room's current seat count to `players_count`
    ///
    /// Count and write are separate requests, so each write is checked
    /// against a fresh count and repeated while a concurrent writer has
    /// left a different value behind.
    pub async fn sync_players_count(&self, room_id: RoomId) -> Result<u32> {
        let mut count = self.players(room_id).await?.len() as u32;
        for _ in 0..SYNC_COUNT_ATTEMPTS {
            self.service
                .update(
                    Collection::Games,
                    Filter::new().eq("id", room_id.to_string()),
                    patch(json!({ "players_count": count })),
                )
                .await?;

            let stored = self.game(room_id).await?.map(|game| game.players_count);
            let current = self.players(room_id).await?.len() as u32;
            if stored == Some(current) {
                return Ok(current);
            }
            count = current;
        }
        warn!(
            "players_count for room {} still unsettled after {} attempts",
            room_id, SYNC_COUNT_ATTEMPTS
        );
        Ok(count)
    }

    /// Update the caller's ready flag; returns rows updated
    pub async fn set_player_ready(
        &self,
        room_id: RoomId,
        user_id: &str,
        is_ready: bool,
    ) -> Result<usize> {
        self.service
            .update(
                Collection::GamePlayers,
                Self::own_seat_filter(room_id, user_id),
                patch(json!({ "is_ready": is_ready })),
            )
            .await
    }

    /// Append an activity event
    pub async fn insert_event(
        &self,
        room_id: RoomId,
        user_id: &str,
        kind: ActivityKind,
        player_name: &str,
    ) -> Result<PlayerEventRecord> {
        let record = PlayerEventRecord {
            id: generate_record_id(),
            game_id: room_id,
            user_id: user_id.to_string(),
            event_type: kind,
            player_name: player_name.to_string(),
            created_at: current_timestamp(),
        };
        let stored = self
            .service
            .insert(
                Collection::GamePlayerEvents,
                to_record(Collection::GamePlayerEvents, &record)?,
            )
            .await?;
        from_record(Collection::GamePlayerEvents, stored)
    }

    /// The `limit` most recent events, oldest first
    pub async fn recent_events(
        &self,
        room_id: RoomId,
        limit: usize,
    ) -> Result<Vec<PlayerActivityEvent>> {
        let rows = self
            .service
            .query(
                Collection::GamePlayerEvents,
                Filter::new()
                    .eq("game_id", room_id.to_string())
                    .order_by("created_at", Order::Desc)
                    .limit(limit),
            )
            .await?;
        let mut events: Vec<PlayerActivityEvent> =
            from_records::<PlayerEventRecord>(Collection::GamePlayerEvents, rows)?
                .into_iter()
                .map(PlayerActivityEvent::from)
                .collect();
        events.reverse();
        Ok(events)
    }

    /// Live inserts to the room's activity events
    pub async fn subscribe_events(&self, room_id: RoomId) -> Result<Subscription> {
        self.service
            .subscribe(
                Collection::GamePlayerEvents,
                Filter::new().eq("game_id", room_id.to_string()),
                vec![ChangeKind::Insert],
            )
            .await
    }

    /// Any change to the room's seats
    pub async fn subscribe_players(&self, room_id: RoomId) -> Result<Subscription> {
        self.service
            .subscribe(
                Collection::GamePlayers,
                Filter::new().eq("game_id", room_id.to_string()),
                vec![ChangeKind::Insert, ChangeKind::Update, ChangeKind::Delete],
            )
            .await
    }

    /// Insert or replace a profile
    pub async fn upsert_profile(&self, profile: &ProfileRecord) -> Result<()> {
        let filter = Filter::new().eq("id", profile.id.as_str());
        let record = to_record(Collection::Profiles, profile)?;
        let updated = self
            .service
            .update(Collection::Profiles, filter, record.clone())
            .await?;
        if updated == 0 {
            self.service.insert(Collection::Profiles, record).await?;
        }
        Ok(())
    }

    /// Profiles keyed by user id
    pub async fn profiles(&self, user_ids: &[UserId]) -> Result<HashMap<UserId, ProfileRecord>> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = self
            .service
            .query(
                Collection::Profiles,
                Filter::new().is_in("id", user_ids.iter().map(String::as_str)),
            )
            .await?;
        let profiles: Vec<ProfileRecord> = from_records(Collection::Profiles, rows)?;
        Ok(profiles
            .into_iter()
            .map(|profile| (profile.id.clone(), profile))
            .collect())
    }

    /// Display name for a user, falling back when no profile exists
    pub async fn display_name(&self, user_id: &str) -> Result<String> {
        let profiles = self.profiles(&[user_id.to_string()]).await?;
        Ok(profiles
            .get(user_id)
            .and_then(|profile| profile.username.clone())
            .unwrap_or_else(|| UNKNOWN_PLAYER_NAME.to_string()))
    }

    /// Assemble the authoritative room snapshot
    pub async fn load_room(&self, room_id: RoomId) -> Result<RoomState> {
        let game = self
            .game(room_id)
            .await?
            .ok_or_else(|| RoomError::RoomNotFound {
                room_id: room_id.to_string(),
            })?;
        let seats = self.players(room_id).await?;
        let user_ids: Vec<UserId> = seats.iter().map(|seat| seat.user_id.clone()).collect();
        let profiles = self.profiles(&user_ids).await?;

        let players = seats
            .into_iter()
            .map(|seat| {
                let profile = profiles.get(&seat.user_id);
                RoomPlayer {
                    name: profile
                        .and_then(|p| p.username.clone())
                        .unwrap_or_else(|| UNKNOWN_PLAYER_NAME.to_string()),
                    avatar: profile.and_then(|p| p.avatar_url.clone()),
                    is_ready: seat.is_ready,
                    is_host: game.host_id.as_deref() == Some(seat.user_id.as_str()),
                    position: seat.position,
                    id: seat.user_id,
                }
            })
            .collect();

        Ok(RoomState {
            id: game.id,
            status: game.status,
            players,
            game_mode: game.game_mode,
            game_type: game.game_type,
            wager_amount: (game.wager_amount > 0.0).then_some(game.wager_amount),
            host_id: game.host_id,
            current_phase: game.current_phase,
        })
    }

    /// Move the room to `in_progress` if, at the moment of the write, the
    /// caller is the host, the room has not started, and no seated player
    /// is unready. Returns rows updated (0 or 1).
    pub async fn start_game_if_ready(
        &self,
        room_id: RoomId,
        host_id: &str,
        phase: &str,
    ) -> Result<usize> {
        let filter = Filter::new()
            .eq("id", room_id.to_string())
            .eq("host_id", host_id)
            .is_in(
                "status",
                GameStatus::pre_game().iter().map(GameStatus::as_str),
            )
            .not_exists(
                Collection::GamePlayers,
                Filter::new()
                    .eq("game_id", room_id.to_string())
                    .eq("is_ready", false),
            );
        self.service
            .update(
                Collection::Games,
                filter,
                patch(json!({
                    "status": GameStatus::InProgress.as_str(),
                    "current_phase": phase,
                    "started_at": current_timestamp().to_rfc3339(),
                })),
            )
            .await
    }
}

fn sample_from_game(game: GameRecord) -> MatchmakingSample {
    MatchmakingSample {
        created_at: game.created_at,
        started_at: game.started_at,
        players_count: game.players_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::InMemoryDataService;
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::Mutex;

    fn store() -> RoomStore {
        RoomStore::new(Arc::new(InMemoryDataService::new()))
    }

    /// Lets another writer's outdated seat count land right after the
    /// first update of a game row
    struct OutdatedCountWriter {
        inner: Arc<InMemoryDataService>,
        pending: Mutex<bool>,
    }

    #[async_trait]
    impl DataService for OutdatedCountWriter {
        async fn query(&self, collection: Collection, filter: Filter) -> Result<Vec<Record>> {
            self.inner.query(collection, filter).await
        }

        async fn insert(&self, collection: Collection, record: Record) -> Result<Record> {
            self.inner.insert(collection, record).await
        }

        async fn update(
            &self,
            collection: Collection,
            filter: Filter,
            record: Record,
        ) -> Result<usize> {
            let updated = self.inner.update(collection, filter.clone(), record).await?;
            let due = collection == Collection::Games
                && std::mem::take(&mut *self.pending.lock().unwrap());
            if due {
                self.inner
                    .update(collection, filter, patch(json!({ "players_count": 0 })))
                    .await?;
            }
            Ok(updated)
        }

        async fn delete(&self, collection: Collection, filter: Filter) -> Result<usize> {
            self.inner.delete(collection, filter).await
        }

        async fn subscribe(
            &self,
            collection: Collection,
            filter: Filter,
            kinds: Vec<ChangeKind>,
        ) -> Result<Subscription> {
            self.inner.subscribe(collection, filter, kinds).await
        }
    }

    #[tokio::test]
    async fn test_players_count_recovers_from_outdated_write() {
        let store = RoomStore::new(Arc::new(OutdatedCountWriter {
            inner: Arc::new(InMemoryDataService::new()),
            pending: Mutex::new(true),
        }));
        let room = store
            .create_game(&GameRecord::waiting(GameType::Partnered, 0.0, None))
            .await
            .unwrap();
        store.insert_player(room.id, "u1", Some(Seat::North)).await.unwrap();
        store.insert_player(room.id, "u2", Some(Seat::East)).await.unwrap();

        assert_eq!(store.sync_players_count(room.id).await.unwrap(), 2);
        assert_eq!(store.game(room.id).await.unwrap().unwrap().players_count, 2);
    }

    #[tokio::test]
    async fn test_matched_games_filters_pool_window_and_unmatched() {
        let store = store();
        let now = current_timestamp();

        let mut matched = GameRecord::waiting(GameType::Solo, 5.0, None);
        matched.created_at = now - Duration::hours(1);
        matched.started_at = Some(now - Duration::minutes(58));
        matched.status = GameStatus::InProgress;
        store.create_game(&matched).await.unwrap();

        let mut stale = GameRecord::waiting(GameType::Solo, 5.0, None);
        stale.created_at = now - Duration::hours(30);
        stale.started_at = Some(now - Duration::hours(29));
        stale.status = GameStatus::InProgress;
        store.create_game(&stale).await.unwrap();

        let unmatched = GameRecord::waiting(GameType::Solo, 5.0, None);
        store.create_game(&unmatched).await.unwrap();

        let other_pool = GameRecord::waiting(GameType::Partnered, 5.0, None);
        store.create_game(&other_pool).await.unwrap();

        let samples = store
            .matched_games(GameType::Solo, 5.0, now - Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(samples.len(), 1);

        let open = store.open_games(GameType::Solo, 5.0).await.unwrap();
        assert_eq!(open.len(), 1);
    }

    #[tokio::test]
    async fn test_recent_events_are_oldest_first_and_capped() {
        let store = store();
        let room = store
            .create_game(&GameRecord::waiting(GameType::Solo, 0.0, None))
            .await
            .unwrap();

        for i in 0..25 {
            store
                .insert_event(room.id, "u1", ActivityKind::Ready, &format!("p{}", i))
                .await
                .unwrap();
        }

        let events = store.recent_events(room.id, 20).await.unwrap();
        assert_eq!(events.len(), 20);
        assert_eq!(events.first().unwrap().player_name, "p5");
        assert_eq!(events.last().unwrap().player_name, "p24");
    }

    #[tokio::test]
    async fn test_load_room_marks_host_and_names() {
        let store = store();
        let room = store
            .create_game(&GameRecord::waiting(
                GameType::Partnered,
                10.0,
                Some("host".to_string()),
            ))
            .await
            .unwrap();
        store
            .upsert_profile(&ProfileRecord {
                id: "host".to_string(),
                username: Some("Big Slick".to_string()),
                avatar_url: None,
            })
            .await
            .unwrap();
        store
            .insert_player(room.id, "host", Some(Seat::North))
            .await
            .unwrap();
        store.insert_player(room.id, "guest", None).await.unwrap();

        let state = store.load_room(room.id).await.unwrap();
        assert_eq!(state.players.len(), 2);
        assert!(state.players[0].is_host);
        assert_eq!(state.players[0].name, "Big Slick");
        assert!(!state.players[1].is_host);
        assert_eq!(state.players[1].name, UNKNOWN_PLAYER_NAME);
        assert_eq!(state.wager_amount, Some(10.0));
    }

    #[tokio::test]
    async fn test_start_game_guard_requires_all_ready() {
        let store = store();
        let room = store
            .create_game(&GameRecord::waiting(
                GameType::Solo,
                0.0,
                Some("host".to_string()),
            ))
            .await
            .unwrap();
        store.insert_player(room.id, "host", None).await.unwrap();
        store.insert_player(room.id, "guest", None).await.unwrap();
        store.set_player_ready(room.id, "host", true).await.unwrap();

        assert_eq!(
            store
                .start_game_if_ready(room.id, "host", "bidding")
                .await
                .unwrap(),
            0
        );

        store.set_player_ready(room.id, "guest", true).await.unwrap();
        assert_eq!(
            store
                .start_game_if_ready(room.id, "guest", "bidding")
                .await
                .unwrap(),
            0
        );
        assert_eq!(
            store
                .start_game_if_ready(room.id, "host", "bidding")
                .await
                .unwrap(),
            1
        );

        let game = store.game(room.id).await.unwrap().unwrap();
        assert_eq!(game.status, GameStatus::InProgress);
        assert_eq!(game.current_phase.as_deref(), Some("bidding"));

        // A started room cannot be started twice
        assert_eq!(
            store
                .start_game_if_ready(room.id, "host", "bidding")
                .await
                .unwrap(),
            0
        );
    }
}
