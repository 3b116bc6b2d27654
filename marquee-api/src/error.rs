use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use marquee_domain::SeatLabelError;
use marquee_engine::ReservationError;

use crate::gateway::GatewayError;
use crate::middleware::auth::AuthError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Authentication(#[from] AuthError),
    #[error("{0}")]
    Authorization(String),
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Reservation(#[from] ReservationError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<SeatLabelError> for AppError {
    fn from(err: SeatLabelError) -> Self {
        AppError::Validation(err.to_string())
    }
}

fn reservation_status(err: &ReservationError) -> StatusCode {
    match err {
        ReservationError::SeatUnavailable(_)
        | ReservationError::NotHolder(_)
        | ReservationError::BookingConflict(_)
        | ReservationError::ShowingExists(_) => StatusCode::CONFLICT,
        ReservationError::ShowingNotFound(_) => StatusCode::NOT_FOUND,
        ReservationError::UnknownSeat(_) | ReservationError::EmptyBooking => StatusCode::BAD_REQUEST,
        ReservationError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Authentication(AuthError::Encoding(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
            AppError::Authentication(_) => (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED"),
            AppError::Authorization(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            AppError::Reservation(err) => (reservation_status(err), err.code()),
            AppError::Gateway(GatewayError::Reservation(err)) => (reservation_status(err), err.code()),
            AppError::Gateway(err) => (StatusCode::BAD_REQUEST, err.code()),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Internal Server Error: {}", self);
            "Internal Server Error".to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": message,
            "code": code,
        }));

        (status, body).into_response()
    }
}
