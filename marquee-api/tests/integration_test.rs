use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use marquee_api::middleware::PrincipalResolver;
use marquee_api::{
    app,
    state::{AppState, AuthConfig, Stores},
};
use marquee_domain::{ManualClock, Principal, ShowingId, ViewerId};
use marquee_store::app_config::ReservationConfig;

fn test_state() -> AppState {
    AppState::new(
        Stores::in_memory(),
        AuthConfig {
            secret: "integration-secret".to_string(),
            expiration: 3600,
        },
        &ReservationConfig::default(),
        Arc::new(ManualClock::default()),
    )
}

fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn open_showing(router: &Router, admin: &str, id: i64) {
    let (status, body) = send(
        router,
        request(
            Method::POST,
            "/v1/admin/showings",
            Some(admin),
            Some(json!({ "id": id, "title": "Stalker", "price": 120000 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
}

#[tokio::test]
async fn test_health() {
    let router = app(test_state());
    let (status, body) = send(&router, request(Method::GET, "/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_guest_login_issues_usable_token() {
    let state = test_state();
    let router = app(state.clone());

    let (status, body) = send(&router, request(Method::POST, "/v1/auth/guest", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap();
    let principal = state.principals.resolve(token).unwrap();
    assert_eq!(principal.viewer_id.as_str(), body["viewer_id"].as_str().unwrap());
    assert!(!principal.is_admin());
}

#[tokio::test]
async fn test_admin_routes_require_admin_role() {
    let state = test_state();
    let router = app(state.clone());
    let viewer = state.tokens.issue(&Principal::viewer("v1")).unwrap();

    let (status, body) = send(&router, request(Method::GET, "/v1/admin/bookings", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHENTICATED");

    let (status, body) = send(&router, request(Method::GET, "/v1/admin/bookings", Some(&viewer), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");
}

#[tokio::test]
async fn test_open_showing_and_read_seat_map() {
    let state = test_state();
    let router = app(state.clone());
    let admin = state.tokens.issue(&Principal::admin("root")).unwrap();
    open_showing(&router, &admin, 42).await;

    let (status, body) = send(&router, request(Method::GET, "/v1/showings", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = send(&router, request(Method::GET, "/v1/showings/42/seats", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["showingId"], 42);
    let seats = body["seats"].as_array().unwrap();
    assert_eq!(seats.len(), 100);
    assert_eq!(seats[0]["seatLabel"], "A1");
    assert_eq!(seats[0]["state"], "available");

    let (status, _) = send(
        &router,
        request(
            Method::POST,
            "/v1/admin/showings",
            Some(&admin),
            Some(json!({ "id": 42, "title": "Again", "price": 1 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_unknown_showing_is_not_found() {
    let router = app(test_state());
    let (status, body) = send(&router, request(Method::GET, "/v1/showings/9/seats", None, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "SHOWING_NOT_FOUND");
}

#[tokio::test]
async fn test_seat_map_shows_holder_only_to_the_holder() {
    let state = test_state();
    let router = app(state.clone());
    let admin = state.tokens.issue(&Principal::admin("root")).unwrap();
    open_showing(&router, &admin, 1).await;

    let v1 = ViewerId::from("v1");
    state.engine.hold(ShowingId(1), "A1".parse().unwrap(), &v1).await.unwrap();
    let own = state.tokens.issue(&Principal::viewer("v1")).unwrap();

    let (_, anonymous) = send(&router, request(Method::GET, "/v1/showings/1/seats", None, None)).await;
    assert_eq!(anonymous["seats"][0]["state"], "held");
    assert!(anonymous["seats"][0].get("holderId").is_none());

    let (_, personal) = send(&router, request(Method::GET, "/v1/showings/1/seats", Some(&own), None)).await;
    assert_eq!(personal["seats"][0]["holderId"], "v1");
}

#[tokio::test]
async fn test_booking_over_http() {
    let state = test_state();
    let router = app(state.clone());
    let admin = state.tokens.issue(&Principal::admin("root")).unwrap();
    open_showing(&router, &admin, 3).await;

    let v1 = ViewerId::from("v1");
    for seat in ["C1", "C2"] {
        state.engine.hold(ShowingId(3), seat.parse().unwrap(), &v1).await.unwrap();
    }
    let v1_token = state.tokens.issue(&Principal::viewer("v1")).unwrap();
    let v2_token = state.tokens.issue(&Principal::viewer("v2")).unwrap();
    let body = json!({ "seatLabels": ["C1", "C2"] });

    let (status, conflict) = send(
        &router,
        request(Method::POST, "/v1/showings/3/bookings", Some(&v2_token), Some(body.clone())),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(conflict["code"], "BOOKING_CONFLICT");

    let (status, confirmation) = send(
        &router,
        request(Method::POST, "/v1/showings/3/bookings", Some(&v1_token), Some(body)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(confirmation["totalPrice"], 240000);

    let (status, mine) = send(&router, request(Method::GET, "/v1/bookings/me", Some(&v1_token), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine.as_array().unwrap().len(), 1);

    let (_, all) = send(&router, request(Method::GET, "/v1/admin/bookings", Some(&admin), None)).await;
    assert_eq!(all.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_malformed_seat_label_is_bad_request() {
    let state = test_state();
    let router = app(state.clone());
    let admin = state.tokens.issue(&Principal::admin("root")).unwrap();
    open_showing(&router, &admin, 4).await;
    let token = state.tokens.issue(&Principal::viewer("v1")).unwrap();

    let (status, body) = send(
        &router,
        request(
            Method::POST,
            "/v1/showings/4/bookings",
            Some(&token),
            Some(json!({ "seatLabels": ["ZZ"] })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn test_remove_showing() {
    let state = test_state();
    let router = app(state.clone());
    let admin = state.tokens.issue(&Principal::admin("root")).unwrap();
    open_showing(&router, &admin, 5).await;

    let (status, _) = send(&router, request(Method::DELETE, "/v1/admin/showings/5", Some(&admin), None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&router, request(Method::GET, "/v1/showings/5/seats", None, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
