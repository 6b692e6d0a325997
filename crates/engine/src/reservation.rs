//! Commit, release, and availability-check algorithms.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use common::{EventId, OrderId, ReservationId, SeatId};
use kv_store::KeyValueStore;

use crate::error::{EngineError, Result};
use crate::idempotency::{IdempotencyLayer, Operation, RELEASED, RecordOutcome};
use crate::records::{SeatRecord, SeatStatus};
use crate::repository::InventoryRepository;

/// How a request addresses inventory. Seat mode wins whenever `seat_ids`
/// is non-empty, even if a quantity was also supplied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Quantity(i32),
    Seats(Vec<SeatId>),
}

fn resolve_mode(qty: Option<i32>, seat_ids: &[SeatId]) -> Result<Mode> {
    if !seat_ids.is_empty() {
        let mut seen = HashSet::new();
        for seat_id in seat_ids {
            if seat_id.is_empty() {
                return Err(EngineError::InvalidArgument(
                    "seat_ids must not contain empty ids".to_string(),
                ));
            }
            if !seen.insert(seat_id) {
                return Err(EngineError::InvalidArgument(format!(
                    "duplicate seat id {seat_id}"
                )));
            }
        }
        return Ok(Mode::Seats(seat_ids.to_vec()));
    }
    match qty {
        Some(qty) if qty > 0 => Ok(Mode::Quantity(qty)),
        Some(_) => Err(EngineError::InvalidArgument(
            "qty must be positive".to_string(),
        )),
        None => Err(EngineError::InvalidArgument(
            "exactly one of qty or seat_ids is required".to_string(),
        )),
    }
}

fn require_ids(reservation_id: &ReservationId, event_id: &EventId) -> Result<()> {
    if reservation_id.is_empty() {
        return Err(EngineError::InvalidArgument(
            "reservation_id is required".to_string(),
        ));
    }
    require_event(event_id)
}

fn require_event(event_id: &EventId) -> Result<()> {
    if event_id.is_empty() {
        return Err(EngineError::InvalidArgument(
            "event_id is required".to_string(),
        ));
    }
    Ok(())
}

/// Seats in `records` that are neither `AVAILABLE` nor already owned by
/// this reservation, sorted for deterministic reporting.
fn blocked_seats(records: &[SeatRecord], reservation_id: &ReservationId) -> Vec<SeatId> {
    let mut blocked: Vec<SeatId> = records
        .iter()
        .filter(|seat| {
            seat.status != SeatStatus::Available
                && seat.reservation_id.as_ref() != Some(reservation_id)
        })
        .map(|seat| seat.seat_id.clone())
        .collect();
    blocked.sort();
    blocked
}

/// Commit request. Exactly one of `qty` / `seat_ids` addresses inventory.
#[derive(Debug, Clone)]
pub struct CommitRequest {
    pub reservation_id: ReservationId,
    pub event_id: EventId,
    pub qty: Option<i32>,
    pub seat_ids: Vec<SeatId>,
    /// Opaque to the engine; carried for upstream correlation only.
    pub payment_intent_id: Option<String>,
}

/// Release request; same addressing rules as [`CommitRequest`].
#[derive(Debug, Clone)]
pub struct ReleaseRequest {
    pub reservation_id: ReservationId,
    pub event_id: EventId,
    pub qty: Option<i32>,
    pub seat_ids: Vec<SeatId>,
}

/// Availability request; read-only, no reservation involved.
#[derive(Debug, Clone)]
pub struct CheckRequest {
    pub event_id: EventId,
    pub qty: Option<i32>,
    pub seat_ids: Vec<SeatId>,
}

/// Successful commit outcome. Status is always `CONFIRMED`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReceipt {
    pub order_id: OrderId,
}

/// Advisory availability answer. State may change before a commit; only
/// the commit's own predicate is authoritative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Availability {
    pub available: bool,
    pub unavailable_seats: Vec<SeatId>,
}

/// The reservation engine.
///
/// Holds no mutable in-process state — every fact lives in the store, so
/// calls run in parallel and serialization happens at the store through
/// conditional predicates. The engine never retries a failed commit;
/// retry is the caller's move and idempotency makes it safe.
pub struct ReservationEngine<S> {
    repo: InventoryRepository<S>,
    idempotency: IdempotencyLayer<S>,
    max_retries: u32,
}

impl<S: KeyValueStore> ReservationEngine<S> {
    pub fn new(
        repo: InventoryRepository<S>,
        idempotency: IdempotencyLayer<S>,
        max_retries: u32,
    ) -> Self {
        Self {
            repo,
            idempotency,
            max_retries,
        }
    }

    /// Commits a reservation, decrementing quantity inventory or selling
    /// seats. At most one decrement per reservation ID; replays answer
    /// with the original order ID.
    #[tracing::instrument(
        skip(self, req),
        fields(reservation_id = %req.reservation_id, event_id = %req.event_id)
    )]
    pub async fn commit(&self, req: &CommitRequest) -> Result<CommitReceipt> {
        metrics::counter!("commits_total").increment(1);
        let start = std::time::Instant::now();

        let result = self.commit_inner(req).await;

        metrics::histogram!("commit_duration_seconds").record(start.elapsed().as_secs_f64());
        match &result {
            Err(EngineError::InsufficientInventory { .. })
            | Err(EngineError::SeatsUnavailable { .. }) => {
                metrics::counter!("oversell_refusals_total").increment(1);
            }
            Err(EngineError::Conflict { .. }) => {
                metrics::counter!("commit_conflicts_total").increment(1);
            }
            _ => {}
        }
        result
    }

    async fn commit_inner(&self, req: &CommitRequest) -> Result<CommitReceipt> {
        require_ids(&req.reservation_id, &req.event_id)?;
        let mode = resolve_mode(req.qty, &req.seat_ids)?;
        let now = Utc::now();

        if let Some(existing) = self
            .idempotency
            .find(Operation::Commit, &req.reservation_id, now)
            .await?
        {
            metrics::counter!("idempotent_replays_total").increment(1);
            tracing::debug!(order_id = %existing.operation, "commit replayed from receipt");
            return Ok(CommitReceipt {
                order_id: OrderId::new(existing.operation),
            });
        }

        let order_id = OrderId::mint();
        match mode {
            Mode::Quantity(qty) => self.commit_quantity(req, qty, order_id, now).await,
            Mode::Seats(seat_ids) => self.commit_seats(req, &seat_ids, order_id, now).await,
        }
    }

    async fn commit_quantity(
        &self,
        req: &CommitRequest,
        qty: i32,
        order_id: OrderId,
        now: DateTime<Utc>,
    ) -> Result<CommitReceipt> {
        let inventory = self.repo.get_inventory(&req.event_id).await?;

        match self
            .repo
            .commit_quantity(&req.event_id, qty, inventory.version, now)
            .await
        {
            Ok(()) => {}
            Err(EngineError::Store(e)) if e.is_condition_failed() => {
                // Insufficient stock and a lost version race are the same
                // error at the store; re-read to tell them apart.
                let current = self.repo.get_inventory(&req.event_id).await?;
                if current.remaining < qty {
                    return Err(EngineError::InsufficientInventory {
                        event_id: req.event_id.clone(),
                        requested: qty,
                        remaining: current.remaining,
                    });
                }
                return Err(EngineError::Conflict {
                    event_id: req.event_id.clone(),
                });
            }
            Err(e) => return Err(e),
        }

        let receipt = self.idempotency.receipt(
            Operation::Commit,
            &req.reservation_id,
            order_id.as_str().to_string(),
            req.event_id.clone(),
            now,
        );
        match self.idempotency.record(receipt, now).await {
            Ok(RecordOutcome::Recorded) => Ok(CommitReceipt { order_id }),
            Ok(RecordOutcome::Superseded(existing)) => {
                // A duplicate commit for this reservation landed between the
                // idempotency lookup and the receipt write, so the counter
                // was decremented twice. Hand the surplus back and answer
                // with the winning receipt.
                self.restore_surplus(&req.event_id, qty, now).await;
                Ok(CommitReceipt {
                    order_id: OrderId::new(existing.operation),
                })
            }
            Err(e) => {
                // Receipt write is best-effort: the decrement stands and a
                // lost record costs one extra guarded attempt on retry.
                tracing::warn!(error = %e, "failed to store commit receipt");
                Ok(CommitReceipt { order_id })
            }
        }
    }

    /// Reverses one surplus decrement under a fresh version guard.
    async fn restore_surplus(&self, event_id: &EventId, qty: i32, now: DateTime<Utc>) {
        for _ in 0..=self.max_retries {
            let current = match self.repo.get_inventory(event_id).await {
                Ok(current) => current,
                Err(e) => {
                    tracing::warn!(error = %e, "could not read inventory for restore");
                    return;
                }
            };
            match self
                .repo
                .restore_quantity(event_id, qty, current.version, now)
                .await
            {
                Ok(()) => return,
                Err(EngineError::Store(e)) if e.is_condition_failed() => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "restore write failed");
                    return;
                }
            }
        }
        tracing::error!(
            %event_id,
            qty,
            "surplus decrement not restored after retries; remaining under-counted"
        );
    }

    async fn commit_seats(
        &self,
        req: &CommitRequest,
        seat_ids: &[SeatId],
        order_id: OrderId,
        now: DateTime<Utc>,
    ) -> Result<CommitReceipt> {
        let records = self.repo.get_seats(&req.event_id, seat_ids).await?;
        let blocked = blocked_seats(&records, &req.reservation_id);
        if !blocked.is_empty() {
            return Err(EngineError::SeatsUnavailable {
                event_id: req.event_id.clone(),
                seat_ids: blocked,
            });
        }

        match self
            .repo
            .sell_seats(&req.event_id, seat_ids, &req.reservation_id, now)
            .await
        {
            Ok(()) => {}
            Err(EngineError::Store(e)) if e.is_condition_failed() => {
                // The transaction saw a state the precheck did not; name
                // the seats blocking it now. An empty recompute means a
                // concurrent duplicate already sold every seat to this
                // reservation (the sale predicate does not admit
                // SOLD-by-self), so fall through to the receipt race and
                // answer with its order.
                let records = self.repo.get_seats(&req.event_id, seat_ids).await?;
                let blocked = blocked_seats(&records, &req.reservation_id);
                if !blocked.is_empty() {
                    return Err(EngineError::SeatsUnavailable {
                        event_id: req.event_id.clone(),
                        seat_ids: blocked,
                    });
                }
            }
            Err(e) => return Err(e),
        }

        let receipt = self.idempotency.receipt(
            Operation::Commit,
            &req.reservation_id,
            order_id.as_str().to_string(),
            req.event_id.clone(),
            now,
        );
        match self.idempotency.record(receipt, now).await {
            Ok(RecordOutcome::Recorded) => Ok(CommitReceipt { order_id }),
            // A concurrent duplicate also sold these seats to the same
            // reservation (SOLD → SOLD, no double effect); defer to it.
            Ok(RecordOutcome::Superseded(existing)) => Ok(CommitReceipt {
                order_id: OrderId::new(existing.operation),
            }),
            Err(e) => {
                tracing::warn!(error = %e, "failed to store commit receipt");
                Ok(CommitReceipt { order_id })
            }
        }
    }

    /// Releases a hold. Idempotent: any number of repeats after the first
    /// has no further effect.
    #[tracing::instrument(
        skip(self, req),
        fields(reservation_id = %req.reservation_id, event_id = %req.event_id)
    )]
    pub async fn release(&self, req: &ReleaseRequest) -> Result<()> {
        metrics::counter!("releases_total").increment(1);
        let start = std::time::Instant::now();
        let result = self.release_inner(req).await;
        metrics::histogram!("release_duration_seconds").record(start.elapsed().as_secs_f64());
        result
    }

    async fn release_inner(&self, req: &ReleaseRequest) -> Result<()> {
        require_ids(&req.reservation_id, &req.event_id)?;
        let mode = resolve_mode(req.qty, &req.seat_ids)?;
        let now = Utc::now();

        if self
            .idempotency
            .find(Operation::Release, &req.reservation_id, now)
            .await?
            .is_some()
        {
            metrics::counter!("idempotent_replays_total").increment(1);
            return Ok(());
        }

        match &mode {
            Mode::Quantity(qty) => {
                // The row must exist; releasing against an unknown event is
                // NOT_FOUND, not an upsert of a partial row.
                self.repo.get_inventory(&req.event_id).await?;
                self.repo
                    .adjust_remaining(&req.event_id, i64::from(*qty), now)
                    .await?;
            }
            Mode::Seats(seat_ids) => {
                let records = self.repo.get_seats(&req.event_id, seat_ids).await?;
                // Only holds owned by this reservation go back to
                // AVAILABLE. SOLD seats stay sold; foreign seats are
                // skipped silently.
                let ours: Vec<SeatId> = records
                    .iter()
                    .filter(|seat| {
                        seat.status == SeatStatus::Hold
                            && seat.reservation_id.as_ref() == Some(&req.reservation_id)
                    })
                    .map(|seat| seat.seat_id.clone())
                    .collect();
                if !ours.is_empty() {
                    self.repo.release_seats(&req.event_id, &ours, now).await?;
                }
            }
        }

        let receipt = self.idempotency.receipt(
            Operation::Release,
            &req.reservation_id,
            RELEASED.to_string(),
            req.event_id.clone(),
            now,
        );
        match self.idempotency.record(receipt, now).await {
            Ok(RecordOutcome::Recorded) => Ok(()),
            Ok(RecordOutcome::Superseded(_)) => {
                if let Mode::Quantity(qty) = mode {
                    // A concurrent duplicate also incremented; take one
                    // increment back.
                    if let Err(e) = self
                        .repo
                        .adjust_remaining(&req.event_id, -i64::from(qty), now)
                        .await
                    {
                        tracing::warn!(error = %e, "duplicate release not compensated");
                    }
                }
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to store release receipt");
                Ok(())
            }
        }
    }

    /// Advisory availability check; no lock, no write.
    #[tracing::instrument(skip(self, req), fields(event_id = %req.event_id))]
    pub async fn check(&self, req: &CheckRequest) -> Result<Availability> {
        require_event(&req.event_id)?;
        let mode = resolve_mode(req.qty, &req.seat_ids)?;

        match mode {
            Mode::Quantity(qty) => {
                let inventory = self.repo.get_inventory(&req.event_id).await?;
                Ok(Availability {
                    available: inventory.remaining >= qty,
                    unavailable_seats: Vec::new(),
                })
            }
            Mode::Seats(seat_ids) => {
                let records = self.repo.get_seats(&req.event_id, &seat_ids).await?;
                let mut unavailable: Vec<SeatId> = records
                    .iter()
                    .filter(|seat| seat.status != SeatStatus::Available)
                    .map(|seat| seat.seat_id.clone())
                    .collect();
                unavailable.sort();
                Ok(Availability {
                    available: unavailable.is_empty(),
                    unavailable_seats: unavailable,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seat(seat_id: &str, status: SeatStatus, rid: Option<&str>) -> SeatRecord {
        SeatRecord {
            event_id: EventId::new("evt_1"),
            seat_id: SeatId::new(seat_id),
            status,
            reservation_id: rid.map(ReservationId::new),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn seat_mode_dominates_when_both_supplied() {
        let mode = resolve_mode(Some(2), &[SeatId::new("A-12")]).unwrap();
        assert_eq!(mode, Mode::Seats(vec![SeatId::new("A-12")]));
    }

    #[test]
    fn neither_field_is_invalid() {
        assert!(matches!(
            resolve_mode(None, &[]),
            Err(EngineError::InvalidArgument(_))
        ));
    }

    #[test]
    fn zero_qty_is_invalid() {
        assert!(matches!(
            resolve_mode(Some(0), &[]),
            Err(EngineError::InvalidArgument(_))
        ));
    }

    #[test]
    fn duplicate_seat_ids_are_invalid() {
        let seats = [SeatId::new("A-12"), SeatId::new("A-12")];
        assert!(matches!(
            resolve_mode(None, &seats),
            Err(EngineError::InvalidArgument(_))
        ));
    }

    #[test]
    fn blocked_seats_reports_every_offender_sorted() {
        let rid = ReservationId::new("rsv_e");
        let records = vec![
            seat("B-1", SeatStatus::Hold, Some("rsv_d")),
            seat("A-12", SeatStatus::Sold, Some("rsv_x")),
            seat("A-13", SeatStatus::Available, None),
            seat("A-14", SeatStatus::Hold, Some("rsv_e")),
        ];
        let blocked = blocked_seats(&records, &rid);
        assert_eq!(blocked, vec![SeatId::new("A-12"), SeatId::new("B-1")]);
    }

    #[test]
    fn own_hold_and_own_sale_are_not_blocked() {
        let rid = ReservationId::new("rsv_c");
        let records = vec![
            seat("A-12", SeatStatus::Hold, Some("rsv_c")),
            seat("A-13", SeatStatus::Sold, Some("rsv_c")),
        ];
        assert!(blocked_seats(&records, &rid).is_empty());
    }
}
