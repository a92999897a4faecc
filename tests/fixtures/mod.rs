//! Test fixtures and mock implementations for integration testing

#![allow(dead_code)]

use async_trait::async_trait;
use mockall::mock;
use spades_room::config::RoomConfig;
use spades_room::data::{
    ChangeKind, Collection, DataService, Filter, GameRecord, InMemoryDataService, ProfileRecord,
    Record, RoomStore, Subscription,
};
use spades_room::error::Result;
use spades_room::metrics::MetricsCollector;
use spades_room::room::{RecordingNotifier, RoomPresenceCoordinator};
use spades_room::types::{ActivityKind, GameType, RoomId};
use std::sync::{Arc, Mutex};
use std::time::Duration;

mock! {
    /// Data service whose every call is scripted by the test
    pub FlakyDataService {}

    #[async_trait]
    impl DataService for FlakyDataService {
        async fn query(&self, collection: Collection, filter: Filter) -> Result<Vec<Record>>;
        async fn insert(&self, collection: Collection, record: Record) -> Result<Record>;
        async fn update(&self, collection: Collection, filter: Filter, patch: Record) -> Result<usize>;
        async fn delete(&self, collection: Collection, filter: Filter) -> Result<usize>;
        async fn subscribe(
            &self,
            collection: Collection,
            filter: Filter,
            kinds: Vec<ChangeKind>,
        ) -> Result<Subscription>;
    }
}

/// In-memory service with one-shot hooks around individual requests
pub struct HookedDataService {
    inner: Arc<InMemoryDataService>,
    fail_query_after_update: Mutex<Option<Collection>>,
    query_failure_due: Mutex<bool>,
    event_before_seed: Mutex<Option<(RoomId, String)>>,
}

impl HookedDataService {
    pub fn new(inner: Arc<InMemoryDataService>) -> Self {
        Self {
            inner,
            fail_query_after_update: Mutex::new(None),
            query_failure_due: Mutex::new(false),
            event_before_seed: Mutex::new(None),
        }
    }

    /// Fail the first query that follows a successful update of `collection`
    pub fn fail_query_after_update(&self, collection: Collection) {
        *self.fail_query_after_update.lock().unwrap() = Some(collection);
    }

    /// Insert a join event for `player_name` just before the next event query
    pub fn insert_event_before_seed(&self, room_id: RoomId, player_name: &str) {
        *self.event_before_seed.lock().unwrap() = Some((room_id, player_name.to_string()));
    }
}

#[async_trait]
impl DataService for HookedDataService {
    async fn query(&self, collection: Collection, filter: Filter) -> Result<Vec<Record>> {
        let due = std::mem::take(&mut *self.query_failure_due.lock().unwrap());
        if due {
            return Err(anyhow::anyhow!("connection reset"));
        }

        if collection == Collection::GamePlayerEvents {
            let pending = self.event_before_seed.lock().unwrap().take();
            if let Some((room_id, player_name)) = pending {
                RoomStore::new(self.inner.clone())
                    .insert_event(room_id, "late-arrival", ActivityKind::Join, &player_name)
                    .await?;
            }
        }

        self.inner.query(collection, filter).await
    }

    async fn insert(&self, collection: Collection, record: Record) -> Result<Record> {
        self.inner.insert(collection, record).await
    }

    async fn update(&self, collection: Collection, filter: Filter, patch: Record) -> Result<usize> {
        let updated = self.inner.update(collection, filter, patch).await?;
        let mut armed = self.fail_query_after_update.lock().unwrap();
        if *armed == Some(collection) {
            *armed = None;
            *self.query_failure_due.lock().unwrap() = true;
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

/// Hooked service over a fresh in-memory service, plus a store over it
pub fn create_hooked_store() -> (Arc<HookedDataService>, RoomStore) {
    let service = Arc::new(HookedDataService::new(Arc::new(InMemoryDataService::new())));
    let store = RoomStore::new(service.clone());
    (service, store)
}

/// In-memory service plus a store over it
pub fn create_test_store() -> (Arc<InMemoryDataService>, RoomStore) {
    let service = Arc::new(InMemoryDataService::new());
    let store = RoomStore::new(service.clone());
    (service, store)
}

/// Insert a waiting room hosted by `host_id`
pub async fn create_room(store: &RoomStore, host_id: &str, game_type: GameType) -> RoomId {
    store
        .create_game(&GameRecord::waiting(
            game_type,
            0.0,
            Some(host_id.to_string()),
        ))
        .await
        .expect("Failed to create room")
        .id
}

pub async fn add_profile(store: &RoomStore, user_id: &str, username: &str) {
    store
        .upsert_profile(&ProfileRecord {
            id: user_id.to_string(),
            username: Some(username.to_string()),
            avatar_url: None,
        })
        .await
        .expect("Failed to add profile");
}

/// A coordinator for `user_id` with its own recording notifier
pub fn spawn_coordinator(
    store: &RoomStore,
    user_id: &str,
) -> (RoomPresenceCoordinator, RecordingNotifier) {
    spawn_coordinator_with(store, user_id, RoomConfig::default(), None)
}

pub fn spawn_coordinator_with(
    store: &RoomStore,
    user_id: &str,
    config: RoomConfig,
    metrics: Option<Arc<MetricsCollector>>,
) -> (RoomPresenceCoordinator, RecordingNotifier) {
    let notifier = RecordingNotifier::new();
    let coordinator = RoomPresenceCoordinator::spawn(
        store.clone(),
        user_id,
        config,
        Arc::new(notifier.clone()),
        metrics,
    )
    .expect("Failed to spawn coordinator");
    (coordinator, notifier)
}

/// Poll `condition` until it holds or two seconds pass
pub async fn wait_for<F: FnMut() -> bool>(mut condition: F) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
