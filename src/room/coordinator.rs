//! Room presence coordinator
//!
//! One coordinator acts for one user. Join, leave, ready and start are
//! sent to a per-coordinator actor task and executed strictly in order;
//! the actor owns the room's activity feed and republishes the
//! authoritative room snapshot after every write and every seat change.
//! Public operations return `bool` and never an error.

use crate::config::RoomConfig;
use crate::data::RoomStore;
use crate::error::{Result, RoomError};
use crate::metrics::MetricsCollector;
use crate::room::activity::{ActivityFeed, RoomActivityLog, SharedActivityLog};
use crate::room::notifier::{Notification, Notifier};
use crate::types::{ActivityKind, PlayerActivityEvent, RoomId, RoomState, UserId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Clears an in-flight flag when dropped
struct FlagGuard {
    flag: Arc<AtomicBool>,
}

impl FlagGuard {
    /// Set `flag`, or return `None` if it was already set
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        if flag.swap(true, Ordering::AcqRel) {
            None
        } else {
            Some(Self {
                flag: Arc::clone(flag),
            })
        }
    }
}

impl Drop for FlagGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

enum Command {
    Join {
        room_id: RoomId,
        reply: oneshot::Sender<bool>,
    },
    Leave {
        reply: oneshot::Sender<bool>,
    },
    SetReady {
        is_ready: bool,
        reply: oneshot::Sender<bool>,
    },
    Start {
        reply: oneshot::Sender<bool>,
    },
    Refresh {
        reply: oneshot::Sender<bool>,
    },
}

/// Handle to a user's presence in a waiting room
pub struct RoomPresenceCoordinator {
    user_id: UserId,
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<Option<RoomState>>,
    activity: SharedActivityLog,
    is_joining: Arc<AtomicBool>,
    is_leaving: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl RoomPresenceCoordinator {
    /// Start a coordinator acting as `user_id`
    pub fn spawn(
        store: RoomStore,
        user_id: impl Into<UserId>,
        config: RoomConfig,
        notifier: Arc<dyn Notifier>,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Result<Self> {
        config.validate()?;
        let user_id = user_id.into();

        let (commands, command_rx) = mpsc::channel(config.command_buffer);
        let (snapshot_tx, snapshot) = watch::channel(None);
        let activity = Arc::new(RwLock::new(RoomActivityLog::new(
            config.activity_display_limit,
        )));

        let actor = RoomActor {
            store,
            user_id: user_id.clone(),
            config,
            notifier,
            metrics,
            commands: command_rx,
            snapshot: snapshot_tx,
            activity: Arc::clone(&activity),
            binding: None,
        };
        let task = tokio::spawn(actor.run());

        info!("Started room coordinator for user {}", user_id);

        Ok(Self {
            user_id,
            commands,
            snapshot,
            activity,
            is_joining: Arc::new(AtomicBool::new(false)),
            is_leaving: Arc::new(AtomicBool::new(false)),
            task,
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    async fn request(&self, command: impl FnOnce(oneshot::Sender<bool>) -> Command) -> bool {
        let (reply, response) = oneshot::channel();
        if self.commands.send(command(reply)).await.is_err() {
            warn!("User {}: {}", self.user_id, RoomError::ChannelClosed);
            return false;
        }
        response.await.unwrap_or(false)
    }

    /// Take a seat in `room_id`; false if a join is already in flight
    pub async fn join_room(&self, room_id: RoomId) -> bool {
        let Some(_guard) = FlagGuard::acquire(&self.is_joining) else {
            debug!("Join already in flight for user {}", self.user_id);
            return false;
        };
        self.request(|reply| Command::Join { room_id, reply }).await
    }

    /// Leave the current room; false if a leave is already in flight
    pub async fn leave_room(&self) -> bool {
        let Some(_guard) = FlagGuard::acquire(&self.is_leaving) else {
            debug!("Leave already in flight for user {}", self.user_id);
            return false;
        };
        self.request(|reply| Command::Leave { reply }).await
    }

    pub async fn set_ready(&self, is_ready: bool) -> bool {
        self.request(|reply| Command::SetReady { is_ready, reply })
            .await
    }

    /// Move the room into play (host only, every player ready)
    pub async fn start_game(&self) -> bool {
        self.request(|reply| Command::Start { reply }).await
    }

    /// Re-read the room snapshot
    pub async fn refresh(&self) -> bool {
        self.request(|reply| Command::Refresh { reply }).await
    }

    pub fn is_joining(&self) -> bool {
        self.is_joining.load(Ordering::Acquire)
    }

    pub fn is_leaving(&self) -> bool {
        self.is_leaving.load(Ordering::Acquire)
    }

    /// Latest room snapshot, `None` when not in a room
    pub fn snapshot(&self) -> Option<RoomState> {
        self.snapshot.borrow().clone()
    }

    /// Receiver notified on every snapshot change
    pub fn subscribe(&self) -> watch::Receiver<Option<RoomState>> {
        self.snapshot.clone()
    }

    /// Every activity entry in arrival order
    pub fn activity(&self) -> Vec<PlayerActivityEvent> {
        self.activity
            .read()
            .map(|log| log.entries().to_vec())
            .unwrap_or_default()
    }

    /// Activity entries within the display limit
    pub fn recent_activity(&self) -> Vec<PlayerActivityEvent> {
        self.activity
            .read()
            .map(|log| log.recent().to_vec())
            .unwrap_or_default()
    }

    /// Stop the actor and release the room's subscriptions
    ///
    /// Consumes the handle; dropping it aborts the actor task.
    pub fn shutdown(self) {}
}

impl Drop for RoomPresenceCoordinator {
    fn drop(&mut self) {
        self.task.abort();
        debug!("Stopped room coordinator for user {}", self.user_id);
    }
}

/// The room an actor is currently bound to
struct RoomBinding {
    room_id: RoomId,
    _feed: ActivityFeed,
    presence: mpsc::Receiver<()>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl Drop for RoomBinding {
    fn drop(&mut self) {
        if let Some(metrics) = &self.metrics {
            metrics.room_unbound();
        }
    }
}

enum ActorEvent {
    Command(Command),
    PresenceChanged,
}

struct RoomActor {
    store: RoomStore,
    user_id: UserId,
    config: RoomConfig,
    notifier: Arc<dyn Notifier>,
    metrics: Option<Arc<MetricsCollector>>,
    commands: mpsc::Receiver<Command>,
    snapshot: watch::Sender<Option<RoomState>>,
    activity: SharedActivityLog,
    binding: Option<RoomBinding>,
}

async fn presence_changed(binding: &mut Option<RoomBinding>) -> Option<()> {
    match binding {
        Some(binding) => binding.presence.recv().await,
        None => std::future::pending().await,
    }
}

impl RoomActor {
    async fn run(mut self) {
        loop {
            let event = tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => ActorEvent::Command(command),
                    None => break,
                },
                Some(()) = presence_changed(&mut self.binding) => ActorEvent::PresenceChanged,
            };

            match event {
                ActorEvent::Command(command) => self.handle(command).await,
                ActorEvent::PresenceChanged => {
                    if let Err(e) = self.refresh().await {
                        warn!("Presence refresh failed for user {}: {}", self.user_id, e);
                    }
                }
            }
        }

        self.unbind();
        debug!("Room actor for user {} exited", self.user_id);
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Join { room_id, reply } => {
                let started = Instant::now();
                let result = self.join(room_id).await;
                let _ = reply.send(self.complete("join", result, started));
            }
            Command::Leave { reply } => {
                let started = Instant::now();
                let result = self.leave().await;
                if let Err(e) = &result {
                    self.notifier.notify(Notification::error(
                        "Error",
                        format!("Failed to leave room: {}", e),
                    ));
                }
                let _ = reply.send(self.complete("leave", result, started));
            }
            Command::SetReady { is_ready, reply } => {
                let started = Instant::now();
                let result = self.set_ready(is_ready).await;
                if let Err(e) = &result {
                    self.notifier.notify(Notification::error(
                        "Error",
                        format!("Failed to update ready status: {}", e),
                    ));
                }
                let _ = reply.send(self.complete("set_ready", result, started));
            }
            Command::Start { reply } => {
                let started = Instant::now();
                let result = self.start().await;
                match &result {
                    Ok(()) => self.notifier.notify(Notification::info(
                        "Game started",
                        "The game is starting",
                    )),
                    Err(e) => self.notifier.notify(start_failure(e)),
                }
                let _ = reply.send(self.complete("start", result, started));
            }
            Command::Refresh { reply } => {
                let started = Instant::now();
                let result = self.refresh().await.map(|_| ());
                let _ = reply.send(self.complete("refresh", result, started));
            }
        }
    }

    fn complete(&self, operation: &str, result: Result<()>, started: Instant) -> bool {
        let success = result.is_ok();
        if let Err(e) = result {
            let precondition = e
                .downcast_ref::<RoomError>()
                .is_some_and(RoomError::is_precondition);
            if precondition {
                info!("{} rejected for user {}: {}", operation, self.user_id, e);
            } else {
                warn!("{} failed for user {}: {}", operation, self.user_id, e);
            }
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_room_operation(operation, success, started.elapsed());
        }
        success
    }

    fn bound_room(&self) -> Result<RoomId> {
        self.binding
            .as_ref()
            .map(|binding| binding.room_id)
            .ok_or_else(|| {
                RoomError::NotJoined {
                    room_id: "none".to_string(),
                    user_id: self.user_id.clone(),
                }
                .into()
            })
    }

    async fn bind(&mut self, room_id: RoomId) -> Result<()> {
        let (presence_tx, presence) = mpsc::channel(1);
        let feed = ActivityFeed::mount(
            &self.store,
            room_id,
            &self.config,
            Arc::clone(&self.activity),
            presence_tx,
            self.metrics.clone(),
        )
        .await?;

        if let Some(metrics) = &self.metrics {
            metrics.room_bound();
        }
        self.binding = Some(RoomBinding {
            room_id,
            _feed: feed,
            presence,
            metrics: self.metrics.clone(),
        });
        Ok(())
    }

    fn unbind(&mut self) {
        if let Some(binding) = self.binding.take() {
            debug!("User {} unbound from room {}", self.user_id, binding.room_id);
        }
        self.snapshot.send_replace(None);
    }

    fn publish(&self, state: RoomState) {
        self.snapshot.send_replace(Some(state));
    }

    async fn refresh(&mut self) -> Result<RoomState> {
        let room_id = self.bound_room()?;
        let state = self.store.load_room(room_id).await?;
        self.publish(state.clone());
        Ok(state)
    }

    async fn join(&mut self, room_id: RoomId) -> Result<()> {
        let state = self.store.load_room(room_id).await?;

        let newly_bound = self.binding.as_ref().map(|b| b.room_id) != Some(room_id);
        if newly_bound {
            self.unbind();
            self.bind(room_id).await?;
        }

        let result = self.take_seat(&state).await;
        if result.is_err() && newly_bound {
            self.unbind();
        }
        result
    }

    async fn take_seat(&mut self, state: &RoomState) -> Result<()> {
        let seat = state.next_free_seat();
        let row = self
            .store
            .insert_player(state.id, &self.user_id, seat)
            .await?;

        if let Err(e) = self.announce_join(state.id).await {
            // The seat must not outlive a failed join
            match self.store.remove_seat(row.id).await {
                Ok(_) => self.sync_players_count(state.id).await,
                Err(cleanup) => warn!(
                    "Failed to remove seat {} of user {} in room {}: {}",
                    row.id, self.user_id, state.id, cleanup
                ),
            }
            return Err(e);
        }

        self.sync_players_count(state.id).await;
        self.refresh_after_write(state.id).await;

        info!("User {} joined room {} ({:?})", self.user_id, state.id, seat);
        Ok(())
    }

    async fn announce_join(&self, room_id: RoomId) -> Result<()> {
        let name = self.store.display_name(&self.user_id).await?;
        self.store
            .insert_event(room_id, &self.user_id, ActivityKind::Join, &name)
            .await?;
        Ok(())
    }

    /// Republish the snapshot once a write has been applied
    ///
    /// The write stands even if the re-read fails; the next seat change
    /// or refresh brings the snapshot back in step.
    async fn refresh_after_write(&mut self, room_id: RoomId) {
        if let Err(e) = self.refresh().await {
            warn!(
                "Snapshot refresh failed for user {} in room {}: {}",
                self.user_id, room_id, e
            );
        }
    }

    async fn leave(&mut self) -> Result<()> {
        let room_id = self.bound_room()?;
        let name = self.store.display_name(&self.user_id).await?;
        self.store
            .insert_event(room_id, &self.user_id, ActivityKind::Leave, &name)
            .await?;

        let removed = self.store.delete_player(room_id, &self.user_id).await?;
        if removed == 0 {
            return Err(RoomError::NotJoined {
                room_id: room_id.to_string(),
                user_id: self.user_id.clone(),
            }
            .into());
        }

        self.sync_players_count(room_id).await;
        self.unbind();

        info!("User {} left room {}", self.user_id, room_id);
        Ok(())
    }

    async fn set_ready(&mut self, is_ready: bool) -> Result<()> {
        let room_id = self.bound_room()?;
        let name = self.store.display_name(&self.user_id).await?;
        self.store
            .insert_event(room_id, &self.user_id, ActivityKind::for_ready(is_ready), &name)
            .await?;

        let updated = self
            .store
            .set_player_ready(room_id, &self.user_id, is_ready)
            .await?;
        if updated == 0 {
            return Err(RoomError::NotJoined {
                room_id: room_id.to_string(),
                user_id: self.user_id.clone(),
            }
            .into());
        }

        self.refresh_after_write(room_id).await;
        debug!("User {} set ready={} in room {}", self.user_id, is_ready, room_id);
        Ok(())
    }

    async fn start(&mut self) -> Result<()> {
        let state = self.refresh().await?;
        state.check_can_start(&self.user_id)?;

        let updated = self
            .store
            .start_game_if_ready(state.id, &self.user_id, &self.config.start_phase)
            .await?;
        if updated == 0 {
            return Err(RoomError::StartConflict {
                room_id: state.id.to_string(),
                reason: "room changed before the game could start".to_string(),
            }
            .into());
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_game_started();
        }
        self.refresh_after_write(state.id).await;

        info!("User {} started game in room {}", self.user_id, state.id);
        Ok(())
    }

    /// Keep the room's `players_count` in step with its seats
    async fn sync_players_count(&self, room_id: RoomId) {
        if let Err(e) = self.store.sync_players_count(room_id).await {
            warn!("Failed to update player count for room {}: {}", room_id, e);
        }
    }
}

fn start_failure(error: &anyhow::Error) -> Notification {
    match error.downcast_ref::<RoomError>() {
        Some(precondition @ (RoomError::NotHost | RoomError::PlayersNotReady)) => {
            Notification::error("Cannot start game", precondition.to_string())
        }
        _ => Notification::error("Error", format!("Failed to start game: {}", error)),
    }
}
