use axum::{extract::State, routing::post, Json, Router};
use serde::Serialize;
use uuid::Uuid;

use marquee_domain::Principal;

use crate::{error::AppError, state::AppState};

#[derive(Debug, Serialize)]
struct AuthResponse {
    token: String,
    viewer_id: String,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/guest", post(login_guest))
}

/// Issues a viewer token for an anonymous guest.
async fn login_guest(State(state): State<AppState>) -> Result<Json<AuthResponse>, AppError> {
    let principal = Principal::viewer(format!("guest-{}", Uuid::new_v4()));
    let token = state.tokens.issue(&principal)?;

    Ok(Json(AuthResponse {
        token,
        viewer_id: principal.viewer_id.to_string(),
    }))
}
