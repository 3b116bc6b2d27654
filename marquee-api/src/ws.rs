//! Live seat-map socket.
//!
//! One socket is one connection. The client authenticates with a bearer
//! header or a `token` query parameter, then sends JSON `ClientMessage`s
//! (`join`, `hold`, `release`, `book`). Everything the server says arrives as
//! a `ServerMessage` text frame drained from the connection's outbox.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::Response,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use marquee_domain::{ClientMessage, Principal};

use crate::error::AppError;
use crate::gateway::GatewayError;
use crate::middleware::auth::{AuthError, PrincipalResolver};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    token: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/ws", get(upgrade))
}

/// Browsers cannot set headers on a socket handshake, so the query token is
/// accepted as well.
fn socket_principal(state: &AppState, headers: &HeaderMap, params: &WsParams) -> Result<Principal, AuthError> {
    let header_token = headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));
    let token = header_token
        .or(params.token.as_deref())
        .ok_or(AuthError::MissingToken)?;
    state.principals.resolve(token)
}

async fn upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let principal = socket_principal(&state, &headers, &params)?;
    info!(viewer = %principal.viewer_id, "socket upgrade accepted");
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, principal)))
}

async fn handle_socket(socket: WebSocket, state: AppState, principal: Principal) {
    let gateway = state.gateway.clone();
    let (connection_id, outbox) = gateway.on_connect();
    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        let mut outbox = ReceiverStream::new(outbox);
        while let Some(message) = outbox.next().await {
            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(e) => {
                    warn!(connection = %connection_id, error = %e, "failed to encode server message");
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // The reader is never aborted: a message already being handled runs to
    // completion, and the reader only stops between frames.
    let shutdown = Arc::new(Notify::new());
    let recv_shutdown = shutdown.clone();
    let recv_gateway = gateway.clone();
    let mut recv_task = tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                biased;
                _ = recv_shutdown.notified() => break,
                frame = receiver.next() => frame,
            };
            let Some(Ok(frame)) = frame else {
                break;
            };
            match frame {
                Message::Text(text) => match serde_json::from_str::<ClientMessage>(text.as_str()) {
                    Ok(message) => recv_gateway.handle(connection_id, &principal, message).await,
                    Err(e) => recv_gateway.reject(connection_id, GatewayError::InvalidMessage(e.to_string())),
                },
                Message::Close(_) => break,
                // Pings are answered by axum; binary frames are not part of the protocol.
                _ => {}
            }
        }
    });

    let reader_done = tokio::select! {
        _ = &mut send_task => false,
        _ = &mut recv_task => true,
    };
    if reader_done {
        send_task.abort();
    } else {
        shutdown.notify_one();
        if let Err(e) = recv_task.await {
            warn!(connection = %connection_id, error = %e, "socket reader ended abnormally");
        }
    }

    gateway.on_disconnect(connection_id).await;
    debug!(connection = %connection_id, "socket closed");
}
