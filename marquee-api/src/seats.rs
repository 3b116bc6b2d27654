use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;

use marquee_domain::{SeatSnapshot, Showing, ShowingId};

use crate::error::AppError;
use crate::middleware::PrincipalResolver;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/showings", get(list_showings))
        .route("/v1/showings/{id}/seats", get(get_seats))
}

async fn list_showings(State(state): State<AppState>) -> Result<Json<Vec<Showing>>, AppError> {
    Ok(Json(state.engine.list_showings().await?))
}

/// Public seat map. A valid bearer token reveals the caller's own holds.
async fn get_seats(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
) -> Result<Json<SeatSnapshot>, AppError> {
    let viewer = match bearer {
        Some(TypedHeader(Authorization(bearer))) => Some(state.principals.resolve(bearer.token())?.viewer_id),
        None => None,
    };
    let snapshot = state.engine.snapshot(ShowingId(id), viewer.as_ref()).await?;
    Ok(Json(snapshot))
}
