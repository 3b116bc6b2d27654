use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use marquee_domain::{Booking, Principal, SeatLabel, Showing, ShowingId};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenShowingRequest {
    pub id: i64,
    pub title: String,
    pub price: i64,
    pub rows: Option<u8>,
    pub columns: Option<u16>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/admin/bookings", get(all_bookings))
        .route("/v1/admin/showings", post(open_showing))
        .route("/v1/admin/showings/{id}", delete(remove_showing))
}

async fn all_bookings(State(state): State<AppState>) -> Result<Json<Vec<Booking>>, AppError> {
    Ok(Json(state.engine.all_bookings().await?))
}

async fn open_showing(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<OpenShowingRequest>,
) -> Result<(StatusCode, Json<Showing>), AppError> {
    if req.title.trim().is_empty() {
        return Err(AppError::Validation("Title must not be empty".to_string()));
    }
    if req.price < 0 {
        return Err(AppError::Validation("Price must not be negative".to_string()));
    }
    let rows = req.rows.unwrap_or(Showing::DEFAULT_ROWS);
    let columns = req.columns.unwrap_or(Showing::DEFAULT_COLUMNS);
    if rows == 0 || rows > SeatLabel::MAX_ROWS || columns == 0 {
        return Err(AppError::Validation(format!(
            "Grid must have 1-{} rows and at least one column",
            SeatLabel::MAX_ROWS
        )));
    }

    let showing = Showing {
        id: ShowingId(req.id),
        title: req.title,
        price: req.price,
        rows,
        columns,
        created_at: Utc::now(),
    };
    let showing = state.engine.open_showing(showing).await?;
    info!(showing = %showing.id, admin = %principal.viewer_id, "showing opened by admin");
    Ok((StatusCode::CREATED, Json(showing)))
}

async fn remove_showing(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    state.gateway.remove_showing(ShowingId(id)).await?;
    info!(showing = id, admin = %principal.viewer_id, "showing removed by admin");
    Ok(StatusCode::NO_CONTENT)
}
