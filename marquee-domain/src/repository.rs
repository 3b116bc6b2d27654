use async_trait::async_trait;
use std::error::Error;

use crate::booking::Booking;
use crate::seat::{Seat, SeatLabel, SeatState, SeatTransition};
use crate::showing::{Showing, ShowingId};
use crate::viewer::ViewerId;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store backend failure: {0}")]
    Backend(#[source] Box<dyn Error + Send + Sync>),
    #[error("corrupt seat record: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn backend(err: impl Error + Send + Sync + 'static) -> Self {
        StoreError::Backend(Box::new(err))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of a conditional seat update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome {
    Applied,
    /// The seat was not in the expected state. Nothing was written.
    Conflict(SeatLabel),
    /// The seat does not exist in this showing.
    Missing(SeatLabel),
}

impl CasOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, CasOutcome::Applied)
    }
}

/// Durable per-seat state. Compare-and-set is the only mutation primitive.
#[async_trait]
pub trait SeatStore: Send + Sync {
    /// Creates the grid of a freshly opened showing, every seat available.
    async fn create_seats(&self, showing_id: ShowingId, labels: &[SeatLabel]) -> StoreResult<()>;

    /// Drops every seat of a showing.
    async fn remove_seats(&self, showing_id: ShowingId) -> StoreResult<()>;

    /// Seats of a showing ordered by row, then column.
    async fn get_seats(&self, showing_id: ShowingId) -> StoreResult<Vec<Seat>>;

    async fn get_seat(&self, showing_id: ShowingId, label: SeatLabel) -> StoreResult<Option<Seat>>;

    async fn compare_and_set(
        &self,
        showing_id: ShowingId,
        label: SeatLabel,
        expected: &SeatState,
        next: &SeatState,
    ) -> StoreResult<CasOutcome>;

    /// All-or-nothing variant. Either every transition applies or none does,
    /// and readers never see a subset.
    async fn compare_and_set_all(
        &self,
        showing_id: ShowingId,
        transitions: &[SeatTransition],
    ) -> StoreResult<CasOutcome>;

    /// Showings with at least one held seat.
    async fn showings_with_holds(&self) -> StoreResult<Vec<ShowingId>>;

    /// Returns every held seat to available. Used once at startup.
    async fn release_all_holds(&self) -> StoreResult<u64>;
}

/// Append-only record of confirmed bookings.
#[async_trait]
pub trait BookingLedger: Send + Sync {
    async fn append(&self, booking: &Booking) -> StoreResult<()>;

    async fn bookings_for_viewer(&self, viewer_id: &ViewerId) -> StoreResult<Vec<Booking>>;

    async fn all_bookings(&self) -> StoreResult<Vec<Booking>>;
}

#[async_trait]
pub trait ShowingCatalog: Send + Sync {
    async fn get_showing(&self, showing_id: ShowingId) -> StoreResult<Option<Showing>>;

    async fn list_showings(&self) -> StoreResult<Vec<Showing>>;
}

/// Administrative side of the catalog.
#[async_trait]
pub trait ShowingDirectory: ShowingCatalog {
    async fn insert_showing(&self, showing: &Showing) -> StoreResult<()>;

    /// Returns whether the showing existed.
    async fn remove_showing(&self, showing_id: ShowingId) -> StoreResult<bool>;
}
