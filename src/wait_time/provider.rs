//! Wait time provider and live estimator
//!
//! [`WaitTimeProvider`] fetches pool samples from the data service and
//! runs the heuristic; it never returns an error to its caller and falls
//! back to a fixed estimate when the data service fails.
//! [`WaitTimeEstimator`] keeps an estimate fresh in the background for
//! one (game type, wager) selection and publishes it on a watch channel.

use crate::data::RoomStore;
use crate::error::Result;
use crate::metrics::MetricsCollector;
use crate::types::{GameType, WaitTimeEstimate};
use crate::utils::format_mm_ss;
use crate::wait_time::calculator::{estimate_seconds, EstimateInputs, EstimatorConfig};
use crate::wait_time::clock::Clock;
use crate::wait_time::statistics::PoolStatistics;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Pool a player is about to queue for
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaitTimeRequest {
    pub game_type: GameType,
    pub wager_amount: f64,
}

impl WaitTimeRequest {
    pub fn new(game_type: GameType, wager_amount: f64) -> Self {
        Self {
            game_type,
            wager_amount,
        }
    }
}

/// Computes wait time estimates from the data service
#[derive(Clone)]
pub struct WaitTimeProvider {
    store: RoomStore,
    clock: Arc<dyn Clock>,
    config: EstimatorConfig,
    metrics: Option<Arc<MetricsCollector>>,
}

impl WaitTimeProvider {
    /// Create a new provider
    pub fn new(store: RoomStore, clock: Arc<dyn Clock>, config: EstimatorConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            store,
            clock,
            config,
            metrics: None,
        })
    }

    /// Attach a metrics collector
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Fetch and summarize the pool's historical and open games
    pub async fn pool_statistics(
        &self,
        game_type: GameType,
        wager_amount: f64,
    ) -> Result<PoolStatistics> {
        let since = self.clock.now() - chrono::Duration::hours(self.config.time_window_hours as i64);
        let historical = self
            .store
            .matched_games(game_type, wager_amount, since)
            .await?;
        let current = self.store.open_games(game_type, wager_amount).await?;

        Ok(PoolStatistics::from_samples(&historical, &current))
    }

    /// Estimate in seconds, surfacing data service errors
    pub async fn try_estimate(&self, game_type: GameType, wager_amount: f64) -> Result<u32> {
        let stats = self.pool_statistics(game_type, wager_amount).await?;
        let inputs = EstimateInputs {
            average_wait_seconds: stats.average_wait_seconds,
            active_players: stats.active_players,
            wager_amount,
            local_hour: self.clock.local_hour(),
        };
        let seconds = estimate_seconds(&self.config, &inputs);

        debug!(
            "Estimated wait for {}/{}: {}s (matched: {}, avg: {:.1}s, active players: {}, hour: {})",
            game_type,
            wager_amount,
            seconds,
            stats.matched_games,
            stats.average_wait_seconds,
            stats.active_players,
            inputs.local_hour
        );

        Ok(seconds)
    }

    /// Estimate that never fails; data service errors yield the fallback
    pub async fn estimate(&self, game_type: GameType, wager_amount: f64) -> WaitTimeEstimate {
        let started = Instant::now();
        let (seconds, fallback) = match self.try_estimate(game_type, wager_amount).await {
            Ok(seconds) => (seconds, false),
            Err(e) => {
                warn!(
                    "Failed to estimate wait for {}/{}, using fallback: {}",
                    game_type, wager_amount, e
                );
                (self.config.fallback_wait_seconds, true)
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_estimate(game_type, seconds, fallback, started.elapsed());
        }

        build_estimate(game_type, wager_amount, seconds, false)
    }

    /// Placeholder published before the first estimate is ready
    pub fn loading_estimate(&self, game_type: GameType, wager_amount: f64) -> WaitTimeEstimate {
        build_estimate(
            game_type,
            wager_amount,
            self.config.fallback_wait_seconds,
            true,
        )
    }

    /// Start a background estimator for `request`
    pub fn spawn_live(&self, request: WaitTimeRequest) -> WaitTimeEstimator {
        WaitTimeEstimator::spawn(self.clone(), request)
    }
}

fn build_estimate(
    game_type: GameType,
    wager_amount: f64,
    estimated_seconds: u32,
    is_loading: bool,
) -> WaitTimeEstimate {
    WaitTimeEstimate {
        game_type,
        wager_amount,
        estimated_seconds,
        formatted: format_mm_ss(estimated_seconds),
        is_loading,
    }
}

/// Background estimator for one pool selection
///
/// Recomputes on every input change and on the configured interval.
/// Dropping the estimator stops its refresh task.
pub struct WaitTimeEstimator {
    request_tx: watch::Sender<WaitTimeRequest>,
    estimate_rx: watch::Receiver<WaitTimeEstimate>,
    task: JoinHandle<()>,
}

impl WaitTimeEstimator {
    fn spawn(provider: WaitTimeProvider, request: WaitTimeRequest) -> Self {
        let (request_tx, request_rx) = watch::channel(request);
        let (estimate_tx, estimate_rx) = watch::channel(
            provider.loading_estimate(request.game_type, request.wager_amount),
        );

        let task = tokio::spawn(run_refresh_loop(provider, request_rx, estimate_tx));
        info!(
            "Started wait time estimator for {}/{}",
            request.game_type, request.wager_amount
        );

        Self {
            request_tx,
            estimate_rx,
            task,
        }
    }

    /// Change the pool selection; triggers an immediate recompute
    pub fn set_inputs(&self, game_type: GameType, wager_amount: f64) {
        let request = WaitTimeRequest::new(game_type, wager_amount);
        self.request_tx.send_if_modified(|current| {
            if *current == request {
                false
            } else {
                *current = request;
                true
            }
        });
    }

    /// Latest published estimate
    pub fn current(&self) -> WaitTimeEstimate {
        self.estimate_rx.borrow().clone()
    }

    /// Receiver notified on every published estimate
    pub fn subscribe(&self) -> watch::Receiver<WaitTimeEstimate> {
        self.estimate_rx.clone()
    }

    /// Wait until an estimate for the current selection is published
    pub async fn loaded(&self) -> WaitTimeEstimate {
        let mut receiver = self.estimate_rx.clone();
        let request = *self.request_tx.borrow();
        let result = receiver
            .wait_for(|estimate| {
                !estimate.is_loading
                    && estimate.game_type == request.game_type
                    && estimate.wager_amount == request.wager_amount
            })
            .await
            .map(|estimate| estimate.clone());
        match result {
            Ok(estimate) => estimate,
            Err(_) => self.current(),
        }
    }

    /// Stop the refresh task
    ///
    /// Consumes the handle; dropping it aborts the task.
    pub fn shutdown(self) {}
}

impl Drop for WaitTimeEstimator {
    fn drop(&mut self) {
        self.task.abort();
        debug!("Stopped wait time estimator");
    }
}

async fn run_refresh_loop(
    provider: WaitTimeProvider,
    mut request_rx: watch::Receiver<WaitTimeRequest>,
    estimate_tx: watch::Sender<WaitTimeEstimate>,
) {
    let period = Duration::from_secs(provider.config.refresh_interval_seconds);
    let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let request = *request_rx.borrow_and_update();
        let estimate = provider
            .estimate(request.game_type, request.wager_amount)
            .await;

        match request_rx.has_changed() {
            // Selection changed mid-fetch; recompute for the new one
            Ok(true) => continue,
            Ok(false) => {
                estimate_tx.send_replace(estimate);
            }
            Err(_) => break,
        }

        tokio::select! {
            _ = ticker.tick() => {
                debug!("Periodic wait time refresh for {}/{}", request.game_type, request.wager_amount);
            }
            changed = request_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                ticker.reset();
                let next = *request_rx.borrow();
                estimate_tx.send_modify(|estimate| {
                    *estimate = provider.loading_estimate(next.game_type, next.wager_amount);
                });
            }
        }
    }
}
