use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error};

use marquee_domain::{ConnectionId, SeatLabel, ServerMessage, ShowingId, Subscription, ViewerId};

use crate::broadcast::BroadcastHub;
use crate::engine::ReservationEngine;
use crate::error::ReservationError;

/// Which showing each live connection is watching, and for whom.
///
/// A connection has at most one subscription. Detaching releases whatever
/// the viewer still holds in that showing.
pub struct PresenceTracker {
    engine: Arc<ReservationEngine>,
    hub: Arc<BroadcastHub>,
    subscriptions: RwLock<HashMap<ConnectionId, Subscription>>,
}

impl PresenceTracker {
    pub fn new(engine: Arc<ReservationEngine>, hub: Arc<BroadcastHub>) -> Self {
        Self {
            engine,
            hub,
            subscriptions: RwLock::new(HashMap::new()),
        }
    }

    /// Replaces any previous subscription of the connection. Seats held in
    /// the previous showing stay held.
    pub async fn attach(
        &self,
        connection_id: ConnectionId,
        showing_id: ShowingId,
        viewer_id: ViewerId,
    ) -> Option<Subscription> {
        let subscription = Subscription {
            connection_id,
            showing_id,
            viewer_id: viewer_id.clone(),
        };
        let previous = self
            .subscriptions
            .write()
            .await
            .insert(connection_id, subscription);

        self.hub.subscribe(connection_id, showing_id, viewer_id).await;

        if let Some(prev) = previous.as_ref().filter(|prev| prev.showing_id != showing_id) {
            self.hub.send_to_room_except(
                prev.showing_id,
                connection_id,
                ServerMessage::ViewerLeft {
                    presence_id: connection_id,
                },
            );
        }
        self.hub.send_to_room_except(
            showing_id,
            connection_id,
            ServerMessage::ViewerJoined {
                presence_id: connection_id,
            },
        );
        debug!(connection = %connection_id, showing = %showing_id, "attached");
        previous
    }

    /// Releases the viewer's holds in the attached showing, then drops the
    /// subscription. Returns the released seats.
    pub async fn detach(&self, connection_id: ConnectionId) -> Result<Vec<SeatLabel>, ReservationError> {
        let Some(subscription) = self.subscription(connection_id).await else {
            return Ok(Vec::new());
        };
        self.hub.unsubscribe(connection_id);

        let released = self
            .engine
            .release_all_held_by(subscription.showing_id, &subscription.viewer_id)
            .await;
        self.subscriptions.write().await.remove(&connection_id);

        self.hub.send_to_room_except(
            subscription.showing_id,
            connection_id,
            ServerMessage::ViewerLeft {
                presence_id: connection_id,
            },
        );

        match released {
            Ok(released) => {
                debug!(
                    connection = %connection_id,
                    showing = %subscription.showing_id,
                    released = released.len(),
                    "detached"
                );
                Ok(released)
            }
            Err(e) => {
                error!(connection = %connection_id, showing = %subscription.showing_id, error = %e, "failed to release holds on detach");
                Err(e)
            }
        }
    }

    pub async fn subscription(&self, connection_id: ConnectionId) -> Option<Subscription> {
        self.subscriptions.read().await.get(&connection_id).cloned()
    }

    /// Drops every subscription to a removed showing without releasing
    /// anything; the seats are already gone.
    pub async fn forget_showing(&self, showing_id: ShowingId) -> usize {
        let mut subscriptions = self.subscriptions.write().await;
        let before = subscriptions.len();
        subscriptions.retain(|_, subscription| subscription.showing_id != showing_id);
        before - subscriptions.len()
    }

    pub async fn connection_count(&self) -> usize {
        self.subscriptions.read().await.len()
    }
}
