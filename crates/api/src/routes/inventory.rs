//! The three reservation endpoints.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::State;
use common::{EventId, ReservationId, SeatId};
use engine::{CheckRequest, CommitRequest, ReleaseRequest, ReservationEngine};
use kv_store::KeyValueStore;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: KeyValueStore> {
    pub engine: ReservationEngine<S>,
    /// Hard per-call deadline wrapped around every engine call.
    pub deadline: Duration,
}

// -- Request types --

#[derive(Deserialize)]
pub struct CheckBody {
    pub event_id: String,
    #[serde(default)]
    pub qty: Option<i32>,
    #[serde(default)]
    pub seat_ids: Vec<String>,
}

#[derive(Deserialize)]
pub struct CommitBody {
    pub reservation_id: String,
    pub event_id: String,
    #[serde(default)]
    pub qty: Option<i32>,
    #[serde(default)]
    pub seat_ids: Vec<String>,
    #[serde(default)]
    pub payment_intent_id: Option<String>,
}

#[derive(Deserialize)]
pub struct ReleaseBody {
    pub reservation_id: String,
    pub event_id: String,
    #[serde(default)]
    pub qty: Option<i32>,
    #[serde(default)]
    pub seat_ids: Vec<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct CheckResponse {
    pub available: bool,
    pub unavailable_seats: Vec<String>,
}

#[derive(Serialize)]
pub struct CommitResponse {
    pub order_id: String,
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct ReleaseResponse {
    pub status: &'static str,
}

fn to_seat_ids(raw: Vec<String>) -> Vec<SeatId> {
    raw.into_iter().map(SeatId::new).collect()
}

/// Bounds an engine call by the per-call deadline. On expiry the store
/// outcome is indeterminate; the idempotency protocol resolves it on the
/// caller's retry.
async fn with_deadline<T>(
    deadline: Duration,
    call: impl Future<Output = engine::Result<T>>,
) -> Result<T, ApiError> {
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(_) => Err(ApiError::DeadlineExceeded),
    }
}

// -- Handlers --

/// POST /v1/availability/check — advisory availability read.
#[tracing::instrument(skip(state, body))]
pub async fn check<S: KeyValueStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(body): Json<CheckBody>,
) -> Result<Json<CheckResponse>, ApiError> {
    let request = CheckRequest {
        event_id: EventId::new(body.event_id),
        qty: body.qty,
        seat_ids: to_seat_ids(body.seat_ids),
    };
    let availability = with_deadline(state.deadline, state.engine.check(&request)).await?;
    Ok(Json(CheckResponse {
        available: availability.available,
        unavailable_seats: availability
            .unavailable_seats
            .iter()
            .map(|seat| seat.as_str().to_string())
            .collect(),
    }))
}

/// POST /v1/reservations/commit — decrement inventory or sell seats.
#[tracing::instrument(skip(state, body))]
pub async fn commit<S: KeyValueStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(body): Json<CommitBody>,
) -> Result<Json<CommitResponse>, ApiError> {
    let request = CommitRequest {
        reservation_id: ReservationId::new(body.reservation_id),
        event_id: EventId::new(body.event_id),
        qty: body.qty,
        seat_ids: to_seat_ids(body.seat_ids),
        payment_intent_id: body.payment_intent_id,
    };
    let receipt = with_deadline(state.deadline, state.engine.commit(&request)).await?;
    Ok(Json(CommitResponse {
        order_id: receipt.order_id.as_str().to_string(),
        status: "CONFIRMED",
    }))
}

/// POST /v1/reservations/release — idempotently hand a hold back.
#[tracing::instrument(skip(state, body))]
pub async fn release<S: KeyValueStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(body): Json<ReleaseBody>,
) -> Result<Json<ReleaseResponse>, ApiError> {
    let request = ReleaseRequest {
        reservation_id: ReservationId::new(body.reservation_id),
        event_id: EventId::new(body.event_id),
        qty: body.qty,
        seat_ids: to_seat_ids(body.seat_ids),
    };
    with_deadline(state.deadline, state.engine.release(&request)).await?;
    Ok(Json(ReleaseResponse { status: "RELEASED" }))
}
