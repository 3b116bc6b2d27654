use axum::{
    extract::{Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use tracing::info;

use marquee_domain::booking::CreateBookingRequest;
use marquee_domain::{Booking, BookingConfirmation, Principal, ShowingId};

use crate::error::AppError;
use crate::gateway::parse_labels;
use crate::state::AppState;

/// Routes that need an authenticated viewer; the caller layers the auth
/// middleware on top.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/showings/{id}/bookings", post(create_booking))
        .route("/v1/bookings/me", get(my_bookings))
}

/// Converts seats the caller already holds into a booking.
async fn create_booking(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<Json<BookingConfirmation>, AppError> {
    let labels = parse_labels(&req.seat_labels)?;
    let confirmation = state
        .engine
        .book(ShowingId(id), &labels, &principal.viewer_id)
        .await?;
    info!(booking_id = %confirmation.booking_id, viewer = %principal.viewer_id, "booking created over http");
    Ok(Json(confirmation))
}

async fn my_bookings(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<Booking>>, AppError> {
    Ok(Json(state.engine.bookings_for_viewer(&principal.viewer_id).await?))
}
