use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info};

use marquee_domain::repository::{BookingLedger, CasOutcome, SeatStore, ShowingDirectory, StoreError};
use marquee_domain::{
    Booking, BookingConfirmation, Clock, SeatLabel, SeatSnapshot, SeatState, SeatTransition,
    Showing, ShowingId, ViewerId,
};

use crate::error::ReservationError;
use crate::locks::SeatLocks;

/// Told whenever the seat map of a showing changed. The engine knows nothing
/// else about who is listening.
#[async_trait]
pub trait SeatNotifier: Send + Sync {
    async fn notify(&self, showing_id: ShowingId);
}

/// Applies hold / release / book / expire transitions.
///
/// Every mutation runs under the per-seat lock and goes through the store's
/// compare-and-set, so the lock serializes callers inside this process and
/// the CAS keeps the store honest regardless.
pub struct ReservationEngine {
    seats: Arc<dyn SeatStore>,
    showings: Arc<dyn ShowingDirectory>,
    ledger: Arc<dyn BookingLedger>,
    notifier: Arc<dyn SeatNotifier>,
    clock: Arc<dyn Clock>,
    locks: SeatLocks,
}

impl ReservationEngine {
    pub fn new(
        seats: Arc<dyn SeatStore>,
        showings: Arc<dyn ShowingDirectory>,
        ledger: Arc<dyn BookingLedger>,
        notifier: Arc<dyn SeatNotifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            seats,
            showings,
            ledger,
            notifier,
            clock,
            locks: SeatLocks::new(),
        }
    }

    pub async fn showing(&self, showing_id: ShowingId) -> Result<Showing, ReservationError> {
        self.showings
            .get_showing(showing_id)
            .await?
            .ok_or(ReservationError::ShowingNotFound(showing_id))
    }

    pub async fn list_showings(&self) -> Result<Vec<Showing>, ReservationError> {
        Ok(self.showings.list_showings().await?)
    }

    /// Current seat map as `viewer` is allowed to see it.
    pub async fn snapshot(
        &self,
        showing_id: ShowingId,
        viewer: Option<&ViewerId>,
    ) -> Result<SeatSnapshot, ReservationError> {
        self.showing(showing_id).await?;
        let seats = self.seats.get_seats(showing_id).await?;
        Ok(SeatSnapshot::personalized(showing_id, &seats, viewer))
    }

    /// Available -> Held by `viewer` for the hold TTL.
    pub async fn hold(
        &self,
        showing_id: ShowingId,
        label: SeatLabel,
        viewer: &ViewerId,
    ) -> Result<(), ReservationError> {
        self.check_seat(showing_id, label).await?;
        let guard = self.locks.lock(showing_id, label).await;
        let next = SeatState::held(viewer.clone(), self.clock.now());
        let outcome = self
            .seats
            .compare_and_set(showing_id, label, &SeatState::Available, &next)
            .await?;
        drop(guard);

        match outcome {
            CasOutcome::Applied => {
                debug!(showing = %showing_id, seat = %label, viewer = %viewer, "seat held");
                self.notifier.notify(showing_id).await;
                Ok(())
            }
            CasOutcome::Conflict(label) => {
                debug!(showing = %showing_id, seat = %label, viewer = %viewer, "hold lost: seat unavailable");
                Err(ReservationError::SeatUnavailable(label))
            }
            CasOutcome::Missing(label) => Err(self.missing_seat(showing_id, label).await),
        }
    }

    /// Held by `viewer` -> Available.
    pub async fn release(
        &self,
        showing_id: ShowingId,
        label: SeatLabel,
        viewer: &ViewerId,
    ) -> Result<(), ReservationError> {
        self.check_seat(showing_id, label).await?;
        let guard = self.locks.lock(showing_id, label).await;
        let Some(seat) = self.seats.get_seat(showing_id, label).await? else {
            drop(guard);
            return Err(self.missing_seat(showing_id, label).await);
        };
        if !seat.state.is_held_by(viewer) {
            debug!(showing = %showing_id, seat = %label, viewer = %viewer, "release refused: not holder");
            return Err(ReservationError::NotHolder(label));
        }
        let outcome = self
            .seats
            .compare_and_set(showing_id, label, &seat.state, &SeatState::Available)
            .await?;
        drop(guard);

        match outcome {
            CasOutcome::Applied => {
                debug!(showing = %showing_id, seat = %label, viewer = %viewer, "seat released");
                self.notifier.notify(showing_id).await;
                Ok(())
            }
            CasOutcome::Conflict(label) => Err(ReservationError::NotHolder(label)),
            CasOutcome::Missing(label) => Err(self.missing_seat(showing_id, label).await),
        }
    }

    /// Converts seats held by `viewer` into a booking, all or nothing.
    ///
    /// Duplicate labels are collapsed. Seats are validated in request order,
    /// so the first offending seat is the one reported.
    pub async fn book(
        &self,
        showing_id: ShowingId,
        labels: &[SeatLabel],
        viewer: &ViewerId,
    ) -> Result<BookingConfirmation, ReservationError> {
        let mut seen = HashSet::new();
        let requested: Vec<SeatLabel> = labels.iter().copied().filter(|l| seen.insert(*l)).collect();
        if requested.is_empty() {
            return Err(ReservationError::EmptyBooking);
        }
        let showing = self.showing(showing_id).await?;

        // Seats outside the grid never get a lock entry.
        let known: Vec<SeatLabel> = requested.iter().copied().filter(|l| showing.has_seat(l)).collect();
        let guards = self.locks.lock_all(showing_id, &known).await;

        let mut transitions = Vec::with_capacity(requested.len());
        for label in &requested {
            let current = if showing.has_seat(label) {
                self.seats.get_seat(showing_id, *label).await?
            } else {
                None
            };
            match current {
                Some(seat) if seat.state.is_held_by(viewer) => transitions.push(SeatTransition {
                    label: *label,
                    expected: seat.state,
                    next: SeatState::Booked,
                }),
                _ => {
                    debug!(showing = %showing_id, seat = %label, viewer = %viewer, "booking refused");
                    return Err(ReservationError::BookingConflict(*label));
                }
            }
        }
        transitions.sort_by_key(|t| t.label);

        let seat_labels: Vec<SeatLabel> = transitions.iter().map(|t| t.label).collect();
        let booking = Booking::new(
            showing_id,
            viewer.clone(),
            seat_labels,
            showing.price,
            self.clock.now(),
        );

        // The seat commit and the ledger append run on their own task, so a
        // caller dropped halfway cannot leave seats booked without a booking.
        let seats = self.seats.clone();
        let ledger = self.ledger.clone();
        let notifier = self.notifier.clone();
        let commit = tokio::spawn(async move {
            let committed = commit_booking(seats.as_ref(), ledger.as_ref(), &transitions, &booking).await;
            drop(guards);
            if committed.is_ok() {
                notifier.notify(booking.showing_id).await;
            }
            committed.map(|()| booking)
        });
        let booking = commit
            .await
            .map_err(|e| ReservationError::Store(StoreError::backend(e)))??;

        info!(
            showing = %showing_id,
            viewer = %viewer,
            booking_id = %booking.id,
            seats = booking.seat_labels.len(),
            total_price = booking.total_price,
            "booking confirmed"
        );
        Ok(booking.confirmation())
    }

    /// Held and past expiry -> Available, regardless of holder.
    ///
    /// Returns whether the seat was actually released. Does not notify; the
    /// caller coalesces notifications.
    pub async fn expire(&self, showing_id: ShowingId, label: SeatLabel) -> Result<bool, ReservationError> {
        let _guard = self.locks.lock(showing_id, label).await;
        let Some(seat) = self.seats.get_seat(showing_id, label).await? else {
            return Ok(false);
        };
        if !seat.state.is_stale(self.clock.now()) {
            return Ok(false);
        }
        let outcome = self
            .seats
            .compare_and_set(showing_id, label, &seat.state, &SeatState::Available)
            .await?;
        Ok(outcome.is_applied())
    }

    /// Expires every stale hold of a showing and notifies once if anything
    /// changed.
    pub async fn expire_stale(&self, showing_id: ShowingId) -> Result<Vec<SeatLabel>, ReservationError> {
        let now = self.clock.now();
        let stale: Vec<SeatLabel> = self
            .seats
            .get_seats(showing_id)
            .await?
            .into_iter()
            .filter(|seat| seat.state.is_stale(now))
            .map(|seat| seat.label)
            .collect();

        let mut expired = Vec::new();
        for label in stale {
            if self.expire(showing_id, label).await? {
                expired.push(label);
            }
        }
        if !expired.is_empty() {
            debug!(showing = %showing_id, count = expired.len(), "expired stale holds");
            self.notifier.notify(showing_id).await;
        }
        Ok(expired)
    }

    pub async fn showings_with_holds(&self) -> Result<Vec<ShowingId>, ReservationError> {
        Ok(self.seats.showings_with_holds().await?)
    }

    /// Releases every seat of a showing held by `viewer`, notifying once.
    pub async fn release_all_held_by(
        &self,
        showing_id: ShowingId,
        viewer: &ViewerId,
    ) -> Result<Vec<SeatLabel>, ReservationError> {
        let held: Vec<SeatLabel> = self
            .seats
            .get_seats(showing_id)
            .await?
            .into_iter()
            .filter(|seat| seat.state.is_held_by(viewer))
            .map(|seat| seat.label)
            .collect();

        let mut released = Vec::new();
        for label in held {
            let _guard = self.locks.lock(showing_id, label).await;
            let Some(seat) = self.seats.get_seat(showing_id, label).await? else {
                continue;
            };
            if !seat.state.is_held_by(viewer) {
                continue;
            }
            let outcome = self
                .seats
                .compare_and_set(showing_id, label, &seat.state, &SeatState::Available)
                .await?;
            if outcome.is_applied() {
                released.push(label);
            }
        }
        if !released.is_empty() {
            debug!(showing = %showing_id, viewer = %viewer, count = released.len(), "released holds of departing viewer");
            self.notifier.notify(showing_id).await;
        }
        Ok(released)
    }

    /// Registers a showing and creates its seat grid, every seat available.
    pub async fn open_showing(&self, showing: Showing) -> Result<Showing, ReservationError> {
        if self.showings.get_showing(showing.id).await?.is_some() {
            return Err(ReservationError::ShowingExists(showing.id));
        }
        self.showings.insert_showing(&showing).await?;
        self.seats.create_seats(showing.id, &showing.seat_labels()).await?;
        info!(showing = %showing.id, title = %showing.title, seats = showing.seat_count(), "showing opened");
        Ok(showing)
    }

    /// Removes a showing and its seats. Bookings stay in the ledger.
    pub async fn close_showing(&self, showing_id: ShowingId) -> Result<(), ReservationError> {
        if !self.showings.remove_showing(showing_id).await? {
            return Err(ReservationError::ShowingNotFound(showing_id));
        }
        self.seats.remove_seats(showing_id).await?;
        self.locks.forget_showing(showing_id);
        info!(showing = %showing_id, "showing removed");
        Ok(())
    }

    /// Returns every held seat to available. Run once at startup, before
    /// any connection is accepted.
    pub async fn reset_holds(&self) -> Result<u64, ReservationError> {
        let released = self.seats.release_all_holds().await?;
        info!(released, "released holds left over from a previous run");
        Ok(released)
    }

    pub async fn bookings_for_viewer(&self, viewer: &ViewerId) -> Result<Vec<Booking>, ReservationError> {
        Ok(self.ledger.bookings_for_viewer(viewer).await?)
    }

    pub async fn all_bookings(&self) -> Result<Vec<Booking>, ReservationError> {
        Ok(self.ledger.all_bookings().await?)
    }

    /// Rejects labels outside the showing's grid before any lock is taken.
    async fn check_seat(&self, showing_id: ShowingId, label: SeatLabel) -> Result<(), ReservationError> {
        if self.showing(showing_id).await?.has_seat(&label) {
            Ok(())
        } else {
            Err(ReservationError::UnknownSeat(label))
        }
    }

    async fn missing_seat(&self, showing_id: ShowingId, label: SeatLabel) -> ReservationError {
        match self.showings.get_showing(showing_id).await {
            Ok(Some(_)) => ReservationError::UnknownSeat(label),
            Ok(None) => ReservationError::ShowingNotFound(showing_id),
            Err(e) => e.into(),
        }
    }
}

/// Books every seat in one all-or-nothing step, then records the booking.
/// A failed append puts the seats back on hold for the same viewer.
async fn commit_booking(
    seats: &dyn SeatStore,
    ledger: &dyn BookingLedger,
    transitions: &[SeatTransition],
    booking: &Booking,
) -> Result<(), ReservationError> {
    let showing_id = booking.showing_id;
    match seats.compare_and_set_all(showing_id, transitions).await? {
        CasOutcome::Applied => {}
        CasOutcome::Conflict(label) | CasOutcome::Missing(label) => {
            return Err(ReservationError::BookingConflict(label));
        }
    }

    if let Err(e) = ledger.append(booking).await {
        error!(showing = %showing_id, viewer = %booking.viewer_id, error = %e, "ledger append failed, undoing seat commit");
        let undo: Vec<SeatTransition> = transitions
            .iter()
            .map(|t| SeatTransition {
                label: t.label,
                expected: t.next.clone(),
                next: t.expected.clone(),
            })
            .collect();
        if let Err(undo_err) = seats.compare_and_set_all(showing_id, &undo).await {
            error!(showing = %showing_id, error = %undo_err, "failed to undo seat commit");
        }
        return Err(e.into());
    }
    Ok(())
}
