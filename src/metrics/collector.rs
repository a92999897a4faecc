//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the wait time estimator
//! and the waiting-room coordinators.

use crate::types::{ActivityKind, GameType};
use anyhow::Result;
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

/// Main metrics collector for the room service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Estimator metrics
    estimator_metrics: EstimatorMetrics,

    /// Room metrics
    room_metrics: RoomMetrics,
}

/// Wait time estimator metrics
#[derive(Clone)]
pub struct EstimatorMetrics {
    /// Published estimates in seconds
    pub estimate_seconds: HistogramVec,

    /// Estimates that fell back to the default
    pub fallbacks_total: IntCounter,

    /// Time spent fetching samples and computing an estimate
    pub calculation_duration: Histogram,
}

/// Waiting-room metrics
#[derive(Clone)]
pub struct RoomMetrics {
    /// Room operations by operation and outcome
    pub operations_total: IntCounterVec,

    /// Room operation durations
    pub operation_duration: HistogramVec,

    /// Activity events observed on live feeds
    pub activity_events_total: IntCounterVec,

    /// Coordinators currently bound to a room
    pub active_rooms: IntGauge,

    /// Games moved to in_progress
    pub games_started_total: IntCounter,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let estimator_metrics = EstimatorMetrics::new(&registry)?;
        let room_metrics = RoomMetrics::new(&registry)?;

        Ok(Self {
            registry,
            estimator_metrics,
            room_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn estimator(&self) -> &EstimatorMetrics {
        &self.estimator_metrics
    }

    pub fn room(&self) -> &RoomMetrics {
        &self.room_metrics
    }

    /// Record a published estimate
    pub fn record_estimate(
        &self,
        game_type: GameType,
        estimated_seconds: u32,
        fallback: bool,
        duration: Duration,
    ) {
        self.estimator_metrics
            .estimate_seconds
            .with_label_values(&[game_type.as_str()])
            .observe(estimated_seconds as f64);

        if fallback {
            self.estimator_metrics.fallbacks_total.inc();
        }

        self.estimator_metrics
            .calculation_duration
            .observe(duration.as_secs_f64());
    }

    /// Record a room operation
    pub fn record_room_operation(&self, operation: &str, success: bool, duration: Duration) {
        let outcome = if success { "success" } else { "failure" };

        self.room_metrics
            .operations_total
            .with_label_values(&[operation, outcome])
            .inc();

        self.room_metrics
            .operation_duration
            .with_label_values(&[operation])
            .observe(duration.as_secs_f64());
    }

    /// Record an activity event arriving on a live feed
    pub fn record_activity_event(&self, kind: ActivityKind) {
        self.room_metrics
            .activity_events_total
            .with_label_values(&[kind.as_str()])
            .inc();
    }

    pub fn record_game_started(&self) {
        self.room_metrics.games_started_total.inc();
    }

    pub fn room_bound(&self) {
        self.room_metrics.active_rooms.inc();
    }

    pub fn room_unbound(&self) {
        self.room_metrics.active_rooms.dec();
    }

    /// Render all metrics in the Prometheus text format
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new().expect("Failed to create default metrics collector")
    }
}

impl EstimatorMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let estimate_seconds = HistogramVec::new(
            HistogramOpts::new(
                "spades_room_wait_estimate_seconds",
                "Published matchmaking wait estimates",
            )
            .buckets(vec![30.0, 60.0, 120.0, 180.0, 300.0, 450.0, 600.0, 900.0]),
            &["game_type"],
        )?;
        registry.register(Box::new(estimate_seconds.clone()))?;

        let fallbacks_total = IntCounter::new(
            "spades_room_wait_estimate_fallbacks_total",
            "Estimates that used the fallback value",
        )?;
        registry.register(Box::new(fallbacks_total.clone()))?;

        let calculation_duration = Histogram::with_opts(
            HistogramOpts::new(
                "spades_room_wait_estimate_duration_seconds",
                "Time to fetch samples and compute an estimate",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;
        registry.register(Box::new(calculation_duration.clone()))?;

        Ok(Self {
            estimate_seconds,
            fallbacks_total,
            calculation_duration,
        })
    }
}

impl RoomMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let operations_total = IntCounterVec::new(
            Opts::new(
                "spades_room_operations_total",
                "Room operations by operation and outcome",
            ),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(operations_total.clone()))?;

        let operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "spades_room_operation_duration_seconds",
                "Room operation durations",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["operation"],
        )?;
        registry.register(Box::new(operation_duration.clone()))?;

        let activity_events_total = IntCounterVec::new(
            Opts::new(
                "spades_room_activity_events_total",
                "Activity events received on live feeds",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(activity_events_total.clone()))?;

        let active_rooms = IntGauge::new(
            "spades_room_active_rooms",
            "Coordinators currently bound to a room",
        )?;
        registry.register(Box::new(active_rooms.clone()))?;

        let games_started_total =
            IntCounter::new("spades_room_games_started_total", "Games moved to in_progress")?;
        registry.register(Box::new(games_started_total.clone()))?;

        Ok(Self {
            operations_total,
            operation_duration,
            activity_events_total,
            active_rooms,
            games_started_total,
        })
    }
}
