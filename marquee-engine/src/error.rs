use marquee_domain::repository::StoreError;
use marquee_domain::{SeatLabel, ShowingId};

#[derive(Debug, thiserror::Error)]
pub enum ReservationError {
    #[error("seat {0} is not available")]
    SeatUnavailable(SeatLabel),

    #[error("seat {0} is not held by this viewer")]
    NotHolder(SeatLabel),

    #[error("seat {0} cannot be booked: not held by this viewer")]
    BookingConflict(SeatLabel),

    #[error("showing {0} not found")]
    ShowingNotFound(ShowingId),

    #[error("showing {0} already exists")]
    ShowingExists(ShowingId),

    #[error("seat {0} does not exist in this showing")]
    UnknownSeat(SeatLabel),

    #[error("a booking needs at least one seat")]
    EmptyBooking,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ReservationError {
    /// Stable machine-readable code for clients.
    pub fn code(&self) -> &'static str {
        match self {
            ReservationError::SeatUnavailable(_) => "SEAT_UNAVAILABLE",
            ReservationError::NotHolder(_) => "NOT_HOLDER",
            ReservationError::BookingConflict(_) => "BOOKING_CONFLICT",
            ReservationError::ShowingNotFound(_) => "SHOWING_NOT_FOUND",
            ReservationError::ShowingExists(_) => "SHOWING_EXISTS",
            ReservationError::UnknownSeat(_) => "UNKNOWN_SEAT",
            ReservationError::EmptyBooking => "EMPTY_BOOKING",
            ReservationError::Store(_) => "INTERNAL_ERROR",
        }
    }

    /// The seat the error is about, if any.
    pub fn seat_label(&self) -> Option<SeatLabel> {
        match self {
            ReservationError::SeatUnavailable(label)
            | ReservationError::NotHolder(label)
            | ReservationError::BookingConflict(label)
            | ReservationError::UnknownSeat(label) => Some(*label),
            _ => None,
        }
    }
}
