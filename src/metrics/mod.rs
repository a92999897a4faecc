//! Metrics and monitoring for the spades-room service
//!
//! This module provides Prometheus metrics collection and the HTTP
//! endpoints that expose them.

pub mod collector;
pub mod health;

pub use collector::{EstimatorMetrics, MetricsCollector, RoomMetrics};
pub use health::{HealthServer, HealthServerConfig, HealthServerState};
