//! HTTP API server for the challenge voting workflow.
//!
//! Provides REST endpoints for challenges, submissions, votes, experience
//! balances and running sagas, with structured logging (tracing) and
//! Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use domain::{ChallengeEvent, ChallengeService};
use event_bus::{EventBus, EventBusError, LoggingHandler, ShutdownStatus};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::SagaManager;
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store> {
    pub service: ChallengeService<S>,
}

impl<S: Store> AppState<S> {
    /// Wires the event bus, its audit subscriber and the challenge service
    /// over `store`. Must be called from within a Tokio runtime.
    pub fn new(store: S, config: &Config) -> Result<Self, EventBusError> {
        let bus = EventBus::new(config.event_bus.clone());
        bus.subscribe_many(&ChallengeEvent::ALL, Arc::new(LoggingHandler))?;

        let service = ChallengeService::with_ledger_rewards(
            store,
            bus,
            SagaManager::new(),
            config.challenge.clone(),
        );
        Ok(Self { service })
    }

    /// Drains pending re-evaluations, then the event bus.
    pub async fn shutdown(&self) -> ShutdownStatus {
        self.service.shutdown().await;
        self.service.bus().shutdown().await
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store>(state: Arc<AppState<S>>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route(
            "/challenges",
            post(routes::challenges::create::<S>).get(routes::challenges::list::<S>),
        )
        .route("/challenges/{id}", get(routes::challenges::get::<S>))
        .route(
            "/challenges/{id}/deactivate",
            post(routes::challenges::deactivate::<S>),
        )
        .route(
            "/challenges/{id}/submissions",
            post(routes::challenges::submit::<S>).get(routes::challenges::submissions::<S>),
        )
        .route("/submissions/{id}", get(routes::submissions::get::<S>))
        .route(
            "/submissions/{id}/votes",
            post(routes::submissions::vote::<S>).get(routes::submissions::votes::<S>),
        )
        .route("/users/{id}/xp", get(routes::users::xp::<S>))
        .route("/sagas", get(routes::sagas::list::<S>))
        .route("/sagas/{id}/stop", post(routes::sagas::stop::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
