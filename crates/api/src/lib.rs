//! HTTP facade for the inventory reservation engine.
//!
//! Exposes the three reservation methods as JSON endpoints with structured
//! logging (tracing), Prometheus metrics, a hard per-call deadline, and a
//! shed-don't-queue concurrency cap.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::error_handling::HandleErrorLayer;
use axum::http::StatusCode;
use axum::routing::{get, post};
use engine::{IdempotencyLayer, InventoryRepository, ReservationEngine, TableNames};
use kv_store::{InMemoryStore, KeyValueStore};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use routes::inventory::AppState;

/// Maps middleware failures to responses. Load shedding answers 429 with
/// the canonical `RESOURCE_EXHAUSTED` code; callers should back off rather
/// than queue behind a saturated server.
async fn handle_middleware_error(
    err: axum::BoxError,
) -> (StatusCode, axum::Json<serde_json::Value>) {
    if err.is::<tower::load_shed::error::Overloaded>() {
        (
            StatusCode::TOO_MANY_REQUESTS,
            axum::Json(serde_json::json!({
                "error": "server at capacity",
                "code": "RESOURCE_EXHAUSTED",
            })),
        )
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            axum::Json(serde_json::json!({
                "error": err.to_string(),
                "code": "INTERNAL",
            })),
        )
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: KeyValueStore + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
    max_concurrency: usize,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/v1/availability/check", post(routes::inventory::check::<S>))
        .route(
            "/v1/reservations/commit",
            post(routes::inventory::commit::<S>),
        )
        .route(
            "/v1/reservations/release",
            post(routes::inventory::release::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_middleware_error))
                .load_shed()
                .concurrency_limit(max_concurrency),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates engine state backed by the in-memory store, provisioning the
/// three tables the way a deployment provisions them out-of-band.
///
/// Returns the repository alongside the state so callers (seeding scripts,
/// tests) can load inventory before serving.
pub async fn create_state(
    config: &Config,
) -> (
    Arc<AppState<InMemoryStore>>,
    InventoryRepository<InMemoryStore>,
) {
    let store = InMemoryStore::new();
    store
        .create_table(&config.store.table_inventory, &["event_id"])
        .await;
    store
        .create_table(&config.store.table_seats, &["event_id", "seat_id"])
        .await;
    store
        .create_table(&config.store.table_idempotency, &["key"])
        .await;

    let tables = TableNames {
        inventory: config.store.table_inventory.clone(),
        seats: config.store.table_seats.clone(),
        idempotency: config.store.table_idempotency.clone(),
    };
    let repo = InventoryRepository::new(store, tables);
    let idempotency = IdempotencyLayer::new(
        repo.clone(),
        config.idempotency.ttl,
        config.idempotency.cache_size,
    );
    let engine = ReservationEngine::new(repo.clone(), idempotency, config.store.max_retries);

    let state = Arc::new(AppState {
        engine,
        deadline: config.server.timeout,
    });
    (state, repo)
}
