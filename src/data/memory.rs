//! In-process data service
//!
//! Keeps every collection in memory behind a single lock and fans
//! changes out over a broadcast channel. Every write, including a
//! guarded update, happens under one write lock, so writes are atomic
//! with respect to each other and change events are emitted in write
//! order.

use crate::data::filter::{Filter, RowSource};
use crate::data::{ChangeEvent, ChangeKind, Collection, DataService, Record, Subscription};
use crate::error::{Result, RoomError};
use crate::utils::generate_record_id;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Mutex, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Data service operation, used to target injected faults
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Query,
    Insert,
    Update,
    Delete,
    Subscribe,
}

#[derive(Debug, Default)]
struct Tables {
    games: Vec<Record>,
    game_players: Vec<Record>,
    game_player_events: Vec<Record>,
    profiles: Vec<Record>,
}

impl Tables {
    fn table(&self, collection: Collection) -> &Vec<Record> {
        match collection {
            Collection::Games => &self.games,
            Collection::GamePlayers => &self.game_players,
            Collection::GamePlayerEvents => &self.game_player_events,
            Collection::Profiles => &self.profiles,
        }
    }

    fn table_mut(&mut self, collection: Collection) -> &mut Vec<Record> {
        match collection {
            Collection::Games => &mut self.games,
            Collection::GamePlayers => &mut self.game_players,
            Collection::GamePlayerEvents => &mut self.game_player_events,
            Collection::Profiles => &mut self.profiles,
        }
    }

    fn matching_indices(&self, collection: Collection, filter: &Filter) -> Vec<usize> {
        self.table(collection)
            .iter()
            .enumerate()
            .filter(|(_, record)| filter.matches(record, self))
            .map(|(index, _)| index)
            .collect()
    }
}

impl RowSource for Tables {
    fn rows(&self, collection: Collection) -> &[Record] {
        self.table(collection)
    }
}

/// Subscriptions only evaluate plain predicates
struct EmptySource;

impl RowSource for EmptySource {
    fn rows(&self, _collection: Collection) -> &[Record] {
        &[]
    }
}

/// In-memory implementation of [`DataService`]
#[derive(Debug)]
pub struct InMemoryDataService {
    tables: RwLock<Tables>,
    changes: broadcast::Sender<ChangeEvent>,
    faults: Mutex<Vec<(Operation, Collection)>>,
    latency: Mutex<Option<Duration>>,
}

impl InMemoryDataService {
    /// Create an empty data service
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create an empty data service with a custom change-channel capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(capacity.max(1));
        Self {
            tables: RwLock::new(Tables::default()),
            changes,
            faults: Mutex::new(Vec::new()),
            latency: Mutex::new(None),
        }
    }

    /// Make the next `operation` on `collection` fail
    pub fn fail_next(&self, operation: Operation, collection: Collection) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.push((operation, collection));
        }
    }

    /// Delay every request by `latency` (for testing in-flight behaviour)
    pub fn set_latency(&self, latency: Option<Duration>) {
        if let Ok(mut current) = self.latency.lock() {
            *current = latency;
        }
    }

    /// Copy of every row in a collection, in insertion order
    pub fn snapshot(&self, collection: Collection) -> Vec<Record> {
        self.tables
            .read()
            .map(|tables| tables.table(collection).clone())
            .unwrap_or_default()
    }

    async fn before_request(&self, operation: Operation, collection: Collection) -> Result<()> {
        let latency = self.latency.lock().ok().and_then(|latency| *latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut faults = self
            .faults
            .lock()
            .map_err(|_| RoomError::DataService {
                message: "Failed to acquire fault list lock".to_string(),
            })?;

        if let Some(position) = faults
            .iter()
            .position(|(op, target)| *op == operation && *target == collection)
        {
            faults.remove(position);
            return Err(RoomError::DataService {
                message: format!("{:?} on {} failed", operation, collection),
            }
            .into());
        }

        Ok(())
    }

    fn emit(&self, event: ChangeEvent) {
        // No receivers is not an error
        let _ = self.changes.send(event);
    }

    fn write_lock_error() -> RoomError {
        RoomError::DataService {
            message: "Failed to acquire tables write lock".to_string(),
        }
    }
}

impl Default for InMemoryDataService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataService for InMemoryDataService {
    async fn query(&self, collection: Collection, filter: Filter) -> Result<Vec<Record>> {
        self.before_request(Operation::Query, collection).await?;

        let tables = self.tables.read().map_err(|_| RoomError::DataService {
            message: "Failed to acquire tables read lock".to_string(),
        })?;

        let rows = filter.apply(tables.table(collection), &*tables);
        debug!("query {} -> {} rows", collection, rows.len());
        Ok(rows)
    }

    async fn insert(&self, collection: Collection, mut record: Record) -> Result<Record> {
        self.before_request(Operation::Insert, collection).await?;

        if !record.contains_key("id") {
            record.insert(
                "id".to_string(),
                Value::String(generate_record_id().to_string()),
            );
        }

        let mut tables = self.tables.write().map_err(|_| Self::write_lock_error())?;
        let id = record.get("id").cloned();
        if tables
            .table(collection)
            .iter()
            .any(|existing| existing.get("id") == id.as_ref())
        {
            return Err(RoomError::DataService {
                message: format!("Duplicate id in {}", collection),
            }
            .into());
        }

        tables.table_mut(collection).push(record.clone());
        self.emit(ChangeEvent {
            collection,
            kind: ChangeKind::Insert,
            new: Some(record.clone()),
            old: None,
        });

        Ok(record)
    }

    async fn update(&self, collection: Collection, filter: Filter, patch: Record) -> Result<usize> {
        self.before_request(Operation::Update, collection).await?;

        let mut tables = self.tables.write().map_err(|_| Self::write_lock_error())?;
        let indices = tables.matching_indices(collection, &filter);

        for &index in &indices {
            let row = &mut tables.table_mut(collection)[index];
            let old = row.clone();
            for (key, value) in &patch {
                row.insert(key.clone(), value.clone());
            }
            let new = row.clone();
            self.emit(ChangeEvent {
                collection,
                kind: ChangeKind::Update,
                new: Some(new),
                old: Some(old),
            });
        }

        debug!("update {} -> {} rows", collection, indices.len());
        Ok(indices.len())
    }

    async fn delete(&self, collection: Collection, filter: Filter) -> Result<usize> {
        self.before_request(Operation::Delete, collection).await?;

        let mut tables = self.tables.write().map_err(|_| Self::write_lock_error())?;
        let indices = tables.matching_indices(collection, &filter);

        // Remove back to front so earlier indices stay valid
        for &index in indices.iter().rev() {
            let old = tables.table_mut(collection).remove(index);
            self.emit(ChangeEvent {
                collection,
                kind: ChangeKind::Delete,
                new: None,
                old: Some(old),
            });
        }

        debug!("delete {} -> {} rows", collection, indices.len());
        Ok(indices.len())
    }

    async fn subscribe(
        &self,
        collection: Collection,
        filter: Filter,
        kinds: Vec<ChangeKind>,
    ) -> Result<Subscription> {
        self.before_request(Operation::Subscribe, collection).await?;

        let receiver = self.changes.subscribe();
        let stream = BroadcastStream::new(receiver).filter_map(move |item| match item {
            Ok(event) => {
                if event.collection != collection || !kinds.contains(&event.kind) {
                    return None;
                }
                let row = event.new.as_ref().or(event.old.as_ref())?;
                if filter.matches(row, &EmptySource) {
                    Some(event)
                } else {
                    None
                }
            }
            Err(lagged) => {
                warn!("Subscription on {} lagged: {}", collection, lagged);
                None
            }
        });

        debug!("subscribed to {} changes", collection);
        Ok(Subscription::new(stream))
    }
}
