use axum::{
    http::Method,
    middleware::from_fn_with_state,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod admin;
pub mod auth;
pub mod bookings;
pub mod error;
pub mod gateway;
pub mod middleware;
pub mod seats;
pub mod state;
pub mod worker;
pub mod ws;


pub use state::AppState;

use middleware::{admin_auth_middleware, rate_limit_middleware, viewer_auth_middleware};

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    let viewer_routes = bookings::routes()
        .route_layer(from_fn_with_state(state.clone(), viewer_auth_middleware));
    let admin_routes = admin::routes()
        .route_layer(from_fn_with_state(state.clone(), admin_auth_middleware));

    let mut router = Router::new()
        .route("/health", get(health))
        .nest("/v1/auth", auth::routes())
        .merge(seats::routes())
        .merge(ws::routes())
        .merge(viewer_routes)
        .merge(admin_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    if state.redis.is_some() {
        router = router.layer(from_fn_with_state(state.clone(), rate_limit_middleware));
    }

    router.with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
