//! Room activity feed
//!
//! The feed is seeded with the most recent events of a room and then grows
//! from the live insert stream, in arrival order. Entries are keyed by
//! event id so an event delivered by both the seed query and the stream is
//! only shown once.

use crate::config::RoomConfig;
use crate::data::{ChangeEvent, PlayerEventRecord, RoomStore, Subscription};
use crate::error::Result;
use crate::metrics::MetricsCollector;
use crate::types::{EventId, PlayerActivityEvent, RoomId};
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Append-only, de-duplicated list of activity events
#[derive(Debug, Clone)]
pub struct RoomActivityLog {
    entries: Vec<PlayerActivityEvent>,
    seen: HashSet<EventId>,
    display_limit: usize,
}

impl RoomActivityLog {
    pub fn new(display_limit: usize) -> Self {
        Self {
            entries: Vec::new(),
            seen: HashSet::new(),
            display_limit,
        }
    }

    /// Append seed events, which must already be ordered oldest first
    pub fn seed(&mut self, events: impl IntoIterator<Item = PlayerActivityEvent>) -> usize {
        events
            .into_iter()
            .filter(|event| self.append(event.clone()))
            .count()
    }

    /// Append one event; returns false if its id was already present
    pub fn append(&mut self, event: PlayerActivityEvent) -> bool {
        if !self.seen.insert(event.id) {
            return false;
        }
        self.entries.push(event);
        true
    }

    /// Every entry in arrival order
    pub fn entries(&self) -> &[PlayerActivityEvent] {
        &self.entries
    }

    /// The last `display_limit` entries
    pub fn recent(&self) -> &[PlayerActivityEvent] {
        let start = self.entries.len().saturating_sub(self.display_limit);
        &self.entries[start..]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.seen.clear();
    }
}

/// Shared handle to a room's activity log
pub type SharedActivityLog = Arc<RwLock<RoomActivityLog>>;

/// Live feed for one room
///
/// Owns the event and seat subscriptions through its task. Dropping the
/// feed aborts the task, which releases both subscriptions.
pub struct ActivityFeed {
    room_id: RoomId,
    task: JoinHandle<()>,
}

impl ActivityFeed {
    /// Subscribe to the room, seed `log` and start streaming into it
    ///
    /// Subscriptions are opened before the seed query so no event written
    /// in between is lost; overlap is removed by id. Every change to the
    /// room's seats is signalled on `presence`.
    pub async fn mount(
        store: &RoomStore,
        room_id: RoomId,
        config: &RoomConfig,
        log: SharedActivityLog,
        presence: mpsc::Sender<()>,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Result<Self> {
        let events = store.subscribe_events(room_id).await?;
        let players = store.subscribe_players(room_id).await?;
        let seed = store
            .recent_events(room_id, config.activity_seed_limit)
            .await?;

        let seeded = match log.write() {
            Ok(mut log) => {
                log.clear();
                log.seed(seed)
            }
            Err(_) => 0,
        };

        let task = tokio::spawn(run_feed(room_id, events, players, log, presence, metrics));
        info!("Mounted activity feed for room {} ({} seeded)", room_id, seeded);

        Ok(Self { room_id, task })
    }
}

impl Drop for ActivityFeed {
    fn drop(&mut self) {
        self.task.abort();
        debug!("Unmounted activity feed for room {}", self.room_id);
    }
}

fn activity_from_change(change: ChangeEvent) -> Option<PlayerActivityEvent> {
    let record = change.new?;
    match serde_json::from_value::<PlayerEventRecord>(serde_json::Value::Object(record)) {
        Ok(record) => Some(record.into()),
        Err(e) => {
            warn!("Ignoring malformed activity event: {}", e);
            None
        }
    }
}

async fn run_feed(
    room_id: RoomId,
    mut events: Subscription,
    mut players: Subscription,
    log: SharedActivityLog,
    presence: mpsc::Sender<()>,
    metrics: Option<Arc<MetricsCollector>>,
) {
    loop {
        tokio::select! {
            change = events.next() => {
                let Some(change) = change else { break };
                let Some(event) = activity_from_change(change) else { continue };
                let kind = event.kind;
                let appended = log.write().map(|mut log| log.append(event)).unwrap_or(false);
                if appended {
                    debug!("Room {} activity: {}", room_id, kind.as_str());
                    if let Some(metrics) = &metrics {
                        metrics.record_activity_event(kind);
                    }
                }
            }
            change = players.next() => {
                if change.is_none() {
                    break;
                }
                // A full queue already has a refresh pending
                let _ = presence.try_send(());
            }
        }
    }

    debug!("Activity feed for room {} closed", room_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActivityKind;
    use crate::utils::{current_timestamp, generate_record_id};

    fn event(name: &str) -> PlayerActivityEvent {
        PlayerActivityEvent {
            id: generate_record_id(),
            kind: ActivityKind::Join,
            player_name: name.to_string(),
            timestamp: current_timestamp(),
        }
    }

    #[test]
    fn test_seed_then_append_keeps_arrival_order() {
        let mut log = RoomActivityLog::new(50);
        let seeded = log.seed(vec![event("a"), event("b")]);
        assert_eq!(seeded, 2);

        log.append(event("c"));
        let names: Vec<&str> = log.entries().iter().map(|e| e.player_name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_duplicate_ids_are_dropped() {
        let mut log = RoomActivityLog::new(50);
        let first = event("a");
        assert!(log.append(first.clone()));
        assert!(!log.append(first));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_out_of_order_timestamps_are_not_resorted() {
        let mut log = RoomActivityLog::new(50);
        let mut late = event("late");
        late.timestamp = current_timestamp() - chrono::Duration::minutes(5);
        log.append(event("early"));
        log.append(late);
        assert_eq!(log.entries()[1].player_name, "late");
    }

    #[test]
    fn test_recent_applies_display_limit() {
        let mut log = RoomActivityLog::new(3);
        for i in 0..5 {
            log.append(event(&format!("p{}", i)));
        }
        assert_eq!(log.len(), 5);
        let names: Vec<&str> = log.recent().iter().map(|e| e.player_name.as_str()).collect();
        assert_eq!(names, vec!["p2", "p3", "p4"]);
    }

    #[test]
    fn test_clear_forgets_ids() {
        let mut log = RoomActivityLog::new(10);
        let e = event("a");
        log.append(e.clone());
        log.clear();
        assert!(log.is_empty());
        assert!(log.append(e));
    }
}
