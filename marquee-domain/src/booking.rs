use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::seat::SeatLabel;
use crate::showing::ShowingId;
use crate::viewer::ViewerId;

/// An entry in the append-only booking ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Uuid,
    pub showing_id: ShowingId,
    pub viewer_id: ViewerId,
    pub seat_labels: Vec<SeatLabel>,
    pub total_price: i64,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn new(
        showing_id: ShowingId,
        viewer_id: ViewerId,
        seat_labels: Vec<SeatLabel>,
        seat_price: i64,
        created_at: DateTime<Utc>,
    ) -> Self {
        let total_price = seat_price * seat_labels.len() as i64;
        Self {
            id: Uuid::new_v4(),
            showing_id,
            viewer_id,
            seat_labels,
            total_price,
            created_at,
        }
    }

    pub fn confirmation(&self) -> BookingConfirmation {
        BookingConfirmation {
            booking_id: self.id,
            total_price: self.total_price,
            seat_labels: self.seat_labels.clone(),
        }
    }
}

/// What the caller gets back after a successful booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingConfirmation {
    pub booking_id: Uuid,
    pub total_price: i64,
    pub seat_labels: Vec<SeatLabel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub seat_labels: Vec<String>,
}
