//! Control loop, cloud sync and HTTP API for a smart streetlight.
//!
//! This crate provides a service that:
//! - Reads the street sensors on a fixed tick, falling back to a simulated
//!   random walk when the remote endpoint is unavailable
//! - Drives the LED lamps and fog lights from configurable lighting rules,
//!   or accepts manual overrides
//! - Stores every reading locally and pushes unsynced ones to a cloud store
//!   whenever the network is reachable
//! - Exposes a REST API and a WebSocket stream of per-tick snapshots
//!
//! # REST API Endpoints
//!
//! - `GET /api/health` - Service health check
//! - `GET /api/status` - Controller, link and store status with the full snapshot
//! - `GET /api/statistics` - Statistics over the history window
//! - `GET /api/logs` - Most recent stored readings
//! - `GET /api/readings` - Stored readings with time filters and pagination
//! - `GET /api/readings/export` - The same readings as CSV
//! - `DELETE /api/readings?confirm=true` - Clear stored history
//! - `GET|PUT /api/thresholds` - Rule thresholds
//! - `PUT /api/mode` - Automatic or manual control
//! - `PUT /api/offline` - Force offline operation
//! - `GET|POST /api/device` - Actuator state and manual overrides
//! - `POST /api/sync` - Sync now
//! - `POST /api/controller/{start,stop}` - Control loop lifecycle
//! - `WS /api/ws` - Live tick events
//!
//! The `simulate` command serves a stand-in for the streetlight's own
//! endpoint; see [`simulator`].
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/streetlight/controller.toml`.
//! See [`config`] for the format.

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod api;
pub mod config;
pub mod controller;
pub mod simulator;
pub mod state;
pub mod sync;
pub mod ws;

pub use config::{
    CloudConfig, Config, ConfigError, ControllerConfig, RemoteConfig, ServerConfig, StorageConfig,
    ThresholdsConfig,
};
pub use controller::{Controller, TickReport};
pub use simulator::SimulatorState;
pub use state::{AppState, ControlState, Links, ReadingSource, Snapshot, TickEvent};
pub use sync::{SyncCoordinator, SyncOutcome, SyncReport};

/// The full controller application: REST API and WebSocket stream.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(api::router())
        .merge(ws::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors())
        .with_state(state)
}

/// The simulated streetlight endpoint.
pub fn simulator_app(state: Arc<SimulatorState>) -> Router {
    simulator::router()
        .layer(TraceLayer::new_for_http())
        .layer(cors())
        .with_state(state)
}

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}
