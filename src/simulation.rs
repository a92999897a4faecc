//! End-to-end walkthrough against an in-memory store
//!
//! Seeds matchmaking history for a pool, asks the estimator for a wait,
//! then seats four players in a fresh room, readies them and has the
//! host start the game.

use crate::config::AppConfig;
use crate::data::{GameRecord, InMemoryDataService, ProfileRecord, RoomStore};
use crate::metrics::MetricsCollector;
use crate::room::{Notifier, RoomPresenceCoordinator, TracingNotifier};
use crate::types::{GameStatus, GameType, PlayerActivityEvent, RoomState, WaitTimeEstimate};
use crate::utils::current_timestamp;
use crate::wait_time::{SystemClock, WaitTimeProvider};
use anyhow::{anyhow, bail, Result};
use chrono::Duration;
use std::sync::Arc;
use tracing::info;

/// Players seated by the walkthrough; the first one hosts
pub const SIMULATED_PLAYERS: [(&str, &str); 4] = [
    ("user-north", "Ace of Spades"),
    ("user-east", "Nil Bidder"),
    ("user-south", "Bag Collector"),
    ("user-west", "Trump Card"),
];

/// What the walkthrough observed
#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub estimate: WaitTimeEstimate,
    pub room: RoomState,
    pub activity: Vec<PlayerActivityEvent>,
}

/// Insert matched games (2 to 7 minute waits) and one open game for the pool
pub async fn seed_history(store: &RoomStore, game_type: GameType, wager_amount: f64) -> Result<()> {
    let now = current_timestamp();

    for (i, wait_minutes) in [2, 3, 4, 5, 6, 7].into_iter().enumerate() {
        let mut game = GameRecord::waiting(game_type, wager_amount, None);
        game.status = GameStatus::InProgress;
        game.players_count = 4;
        game.created_at = now - Duration::hours(i as i64 + 1);
        game.started_at = Some(game.created_at + Duration::minutes(wait_minutes));
        store.create_game(&game).await?;
    }

    let mut open = GameRecord::waiting(game_type, wager_amount, None);
    open.players_count = 2;
    store.create_game(&open).await?;

    Ok(())
}

/// Run the walkthrough
pub async fn run(
    config: &AppConfig,
    metrics: Arc<MetricsCollector>,
    game_type: GameType,
    wager_amount: f64,
) -> Result<SimulationReport> {
    let store = RoomStore::new(Arc::new(InMemoryDataService::new()));
    seed_history(&store, game_type, wager_amount).await?;

    let provider = WaitTimeProvider::new(
        store.clone(),
        Arc::new(SystemClock),
        config.estimator.clone(),
    )?
    .with_metrics(metrics.clone());
    let estimate = provider.estimate(game_type, wager_amount).await;
    info!(
        "Estimated wait for {}/{}: {}",
        game_type, wager_amount, estimate.formatted
    );

    for (user_id, username) in SIMULATED_PLAYERS {
        store
            .upsert_profile(&ProfileRecord {
                id: user_id.to_string(),
                username: Some(username.to_string()),
                avatar_url: None,
            })
            .await?;
    }

    let host_id = SIMULATED_PLAYERS[0].0;
    let room = store
        .create_game(&GameRecord::waiting(
            game_type,
            wager_amount,
            Some(host_id.to_string()),
        ))
        .await?;

    let notifier: Arc<dyn Notifier> = Arc::new(TracingNotifier);
    let mut coordinators = Vec::with_capacity(SIMULATED_PLAYERS.len());
    for (user_id, _) in SIMULATED_PLAYERS {
        let coordinator = RoomPresenceCoordinator::spawn(
            store.clone(),
            user_id,
            config.room.clone(),
            notifier.clone(),
            Some(metrics.clone()),
        )?;
        if !coordinator.join_room(room.id).await {
            bail!("{} could not join room {}", user_id, room.id);
        }
        coordinators.push(coordinator);
    }

    for coordinator in &coordinators {
        if !coordinator.set_ready(true).await {
            bail!("{} could not ready up", coordinator.user_id());
        }
    }

    let host = &coordinators[0];
    if !host.start_game().await {
        bail!("Host could not start room {}", room.id);
    }

    let state = host
        .snapshot()
        .ok_or_else(|| anyhow!("Host has no snapshot of room {}", room.id))?;

    // Live events arrive asynchronously; the store holds the full history
    let activity = store
        .recent_events(room.id, config.room.activity_display_limit)
        .await?;

    for coordinator in coordinators {
        coordinator.shutdown();
    }

    Ok(SimulationReport {
        estimate,
        room: state,
        activity,
    })
}
