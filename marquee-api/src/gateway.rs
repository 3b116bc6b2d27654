use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use marquee_domain::{
    BookingConfirmation, ClientMessage, ConnectionId, Principal, SeatLabel, SeatLabelError,
    ServerMessage, ShowingId,
};
use marquee_engine::{BroadcastHub, PresenceTracker, ReservationEngine, ReservationError};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("invalid seat label: {0}")]
    InvalidSeat(#[from] SeatLabelError),
    #[error("connection is not attached to a showing")]
    NotAttached,
    #[error("malformed message: {0}")]
    InvalidMessage(String),
    #[error(transparent)]
    Reservation(#[from] ReservationError),
}

impl GatewayError {
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::InvalidSeat(_) => "INVALID_SEAT",
            GatewayError::NotAttached => "NOT_ATTACHED",
            GatewayError::InvalidMessage(_) => "INVALID_MESSAGE",
            GatewayError::Reservation(err) => err.code(),
        }
    }

    fn seat_label(&self) -> Option<SeatLabel> {
        match self {
            GatewayError::Reservation(err) => err.seat_label(),
            _ => None,
        }
    }
}

/// Adapter between a live connection and the reservation core.
///
/// Validates what comes in and forwards it. Seat-map fan-out happens only
/// through the hub; the gateway itself only ever answers the connection
/// that asked.
pub struct SessionGateway {
    engine: Arc<ReservationEngine>,
    presence: Arc<PresenceTracker>,
    hub: Arc<BroadcastHub>,
}

impl SessionGateway {
    pub fn new(engine: Arc<ReservationEngine>, presence: Arc<PresenceTracker>, hub: Arc<BroadcastHub>) -> Self {
        Self { engine, presence, hub }
    }

    pub fn on_connect(&self) -> (ConnectionId, mpsc::Receiver<ServerMessage>) {
        let connection_id = ConnectionId::new();
        let outbox = self.hub.connect(connection_id);
        debug!(connection = %connection_id, "connection opened");
        (connection_id, outbox)
    }

    pub async fn on_attach(
        &self,
        connection_id: ConnectionId,
        showing_id: ShowingId,
        principal: &Principal,
    ) -> Result<(), GatewayError> {
        self.engine.showing(showing_id).await?;
        self.hub.send_to(connection_id, ServerMessage::Attached { showing_id });
        self.presence
            .attach(connection_id, showing_id, principal.viewer_id.clone())
            .await;
        Ok(())
    }

    pub async fn on_hold(&self, connection_id: ConnectionId, seat_label: &str) -> Result<(), GatewayError> {
        let subscription = self.presence.subscription(connection_id).await.ok_or(GatewayError::NotAttached)?;
        let label: SeatLabel = seat_label.parse()?;
        self.engine
            .hold(subscription.showing_id, label, &subscription.viewer_id)
            .await?;
        Ok(())
    }

    pub async fn on_release(&self, connection_id: ConnectionId, seat_label: &str) -> Result<(), GatewayError> {
        let subscription = self.presence.subscription(connection_id).await.ok_or(GatewayError::NotAttached)?;
        let label: SeatLabel = seat_label.parse()?;
        self.engine
            .release(subscription.showing_id, label, &subscription.viewer_id)
            .await?;
        Ok(())
    }

    pub async fn on_book(
        &self,
        connection_id: ConnectionId,
        seat_labels: &[String],
    ) -> Result<BookingConfirmation, GatewayError> {
        let subscription = self.presence.subscription(connection_id).await.ok_or(GatewayError::NotAttached)?;
        let labels = parse_labels(seat_labels)?;
        let confirmation = self
            .engine
            .book(subscription.showing_id, &labels, &subscription.viewer_id)
            .await?;
        Ok(confirmation)
    }

    pub async fn on_disconnect(&self, connection_id: ConnectionId) {
        if let Err(e) = self.presence.detach(connection_id).await {
            warn!(connection = %connection_id, error = %e, "holds not released on disconnect, expiry will reclaim them");
        }
        self.hub.disconnect(connection_id);
        debug!(connection = %connection_id, "connection closed");
    }

    /// Dispatches one inbound message and answers the sender directly.
    pub async fn handle(&self, connection_id: ConnectionId, principal: &Principal, message: ClientMessage) {
        let result = match message {
            ClientMessage::Join { showing_id } => self.on_attach(connection_id, showing_id, principal).await,
            ClientMessage::Hold { seat_label } => self.on_hold(connection_id, &seat_label).await,
            ClientMessage::Release { seat_label } => self.on_release(connection_id, &seat_label).await,
            ClientMessage::Book { seat_labels } => {
                self.on_book(connection_id, &seat_labels).await.map(|confirmation| {
                    self.hub
                        .send_to(connection_id, ServerMessage::BookingConfirmed(confirmation));
                })
            }
        };
        if let Err(err) = result {
            self.reject(connection_id, err);
        }
    }

    /// Reports a failure to the connection it came from.
    pub fn reject(&self, connection_id: ConnectionId, err: GatewayError) {
        if matches!(err, GatewayError::Reservation(ReservationError::Store(_))) {
            tracing::error!(connection = %connection_id, error = %err, "request failed");
        } else {
            debug!(connection = %connection_id, error = %err, "request rejected");
        }
        let message = match &err {
            GatewayError::Reservation(ReservationError::Store(_)) => "Internal Server Error".to_string(),
            other => other.to_string(),
        };
        self.hub.send_to(
            connection_id,
            ServerMessage::SeatError {
                code: err.code().to_string(),
                message,
                seat_label: err.seat_label(),
            },
        );
    }

    /// Removes a showing, tells its watchers, and forgets their subscriptions.
    pub async fn remove_showing(&self, showing_id: ShowingId) -> Result<(), ReservationError> {
        self.engine.close_showing(showing_id).await?;
        let dropped = self.presence.forget_showing(showing_id).await;
        let notified = self.hub.close_room(showing_id);
        info!(showing = %showing_id, subscriptions = dropped, notified = notified.len(), "showing closed for viewers");
        Ok(())
    }
}

pub fn parse_labels(raw: &[String]) -> Result<Vec<SeatLabel>, SeatLabelError> {
    raw.iter().map(|s| s.parse()).collect()
}
