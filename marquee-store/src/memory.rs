use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use marquee_domain::repository::{
    BookingLedger, CasOutcome, SeatStore, ShowingCatalog, ShowingDirectory, StoreResult,
};
use marquee_domain::{Booking, Seat, SeatLabel, SeatState, SeatTransition, Showing, ShowingId, ViewerId};

/// Seat store held entirely in process memory. Starts empty, so holds never
/// survive a restart.
#[derive(Default)]
pub struct MemorySeatStore {
    showings: RwLock<HashMap<ShowingId, BTreeMap<SeatLabel, SeatState>>>,
}

impl MemorySeatStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SeatStore for MemorySeatStore {
    async fn create_seats(&self, showing_id: ShowingId, labels: &[SeatLabel]) -> StoreResult<()> {
        let mut showings = self.showings.write().await;
        let grid = showings.entry(showing_id).or_default();
        for label in labels {
            grid.entry(*label).or_insert(SeatState::Available);
        }
        Ok(())
    }

    async fn remove_seats(&self, showing_id: ShowingId) -> StoreResult<()> {
        self.showings.write().await.remove(&showing_id);
        Ok(())
    }

    async fn get_seats(&self, showing_id: ShowingId) -> StoreResult<Vec<Seat>> {
        let showings = self.showings.read().await;
        let seats = showings
            .get(&showing_id)
            .map(|grid| {
                grid.iter()
                    .map(|(label, state)| Seat {
                        showing_id,
                        label: *label,
                        state: state.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(seats)
    }

    async fn get_seat(&self, showing_id: ShowingId, label: SeatLabel) -> StoreResult<Option<Seat>> {
        let showings = self.showings.read().await;
        Ok(showings
            .get(&showing_id)
            .and_then(|grid| grid.get(&label))
            .map(|state| Seat {
                showing_id,
                label,
                state: state.clone(),
            }))
    }

    async fn compare_and_set(
        &self,
        showing_id: ShowingId,
        label: SeatLabel,
        expected: &SeatState,
        next: &SeatState,
    ) -> StoreResult<CasOutcome> {
        let mut showings = self.showings.write().await;
        let Some(current) = showings.get_mut(&showing_id).and_then(|grid| grid.get_mut(&label)) else {
            return Ok(CasOutcome::Missing(label));
        };
        if !current.matches(expected) {
            return Ok(CasOutcome::Conflict(label));
        }
        *current = next.clone();
        Ok(CasOutcome::Applied)
    }

    async fn compare_and_set_all(
        &self,
        showing_id: ShowingId,
        transitions: &[SeatTransition],
    ) -> StoreResult<CasOutcome> {
        let mut showings = self.showings.write().await;
        let Some(grid) = showings.get_mut(&showing_id) else {
            return match transitions.first() {
                Some(t) => Ok(CasOutcome::Missing(t.label)),
                None => Ok(CasOutcome::Applied),
            };
        };

        // Validate everything before touching anything.
        for t in transitions {
            match grid.get(&t.label) {
                None => return Ok(CasOutcome::Missing(t.label)),
                Some(current) if !current.matches(&t.expected) => {
                    return Ok(CasOutcome::Conflict(t.label))
                }
                Some(_) => {}
            }
        }
        for t in transitions {
            grid.insert(t.label, t.next.clone());
        }
        Ok(CasOutcome::Applied)
    }

    async fn showings_with_holds(&self) -> StoreResult<Vec<ShowingId>> {
        let showings = self.showings.read().await;
        let mut ids: Vec<ShowingId> = showings
            .iter()
            .filter(|(_, grid)| grid.values().any(|state| matches!(state, SeatState::Held { .. })))
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn release_all_holds(&self) -> StoreResult<u64> {
        let mut showings = self.showings.write().await;
        let mut released = 0;
        for state in showings.values_mut().flat_map(|grid| grid.values_mut()) {
            if matches!(state, SeatState::Held { .. }) {
                *state = SeatState::Available;
                released += 1;
            }
        }
        Ok(released)
    }
}

#[derive(Default)]
pub struct MemoryBookingLedger {
    bookings: RwLock<Vec<Booking>>,
}

impl MemoryBookingLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookingLedger for MemoryBookingLedger {
    async fn append(&self, booking: &Booking) -> StoreResult<()> {
        self.bookings.write().await.push(booking.clone());
        Ok(())
    }

    async fn bookings_for_viewer(&self, viewer_id: &ViewerId) -> StoreResult<Vec<Booking>> {
        let bookings = self.bookings.read().await;
        Ok(bookings
            .iter()
            .filter(|b| &b.viewer_id == viewer_id)
            .cloned()
            .collect())
    }

    async fn all_bookings(&self) -> StoreResult<Vec<Booking>> {
        Ok(self.bookings.read().await.clone())
    }
}

#[derive(Default)]
pub struct MemoryShowingDirectory {
    showings: RwLock<BTreeMap<ShowingId, Showing>>,
}

impl MemoryShowingDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ShowingCatalog for MemoryShowingDirectory {
    async fn get_showing(&self, showing_id: ShowingId) -> StoreResult<Option<Showing>> {
        Ok(self.showings.read().await.get(&showing_id).cloned())
    }

    async fn list_showings(&self) -> StoreResult<Vec<Showing>> {
        Ok(self.showings.read().await.values().cloned().collect())
    }
}

#[async_trait]
impl ShowingDirectory for MemoryShowingDirectory {
    async fn insert_showing(&self, showing: &Showing) -> StoreResult<()> {
        self.showings.write().await.insert(showing.id, showing.clone());
        Ok(())
    }

    async fn remove_showing(&self, showing_id: ShowingId) -> StoreResult<bool> {
        Ok(self.showings.write().await.remove(&showing_id).is_some())
    }
}
