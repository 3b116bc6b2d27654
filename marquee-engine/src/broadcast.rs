use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{debug, error, warn};

use marquee_domain::repository::SeatStore;
use marquee_domain::{ConnectionId, SeatSnapshot, ServerMessage, ShowingId, ViewerId};

use crate::engine::SeatNotifier;

struct Outbox {
    sender: mpsc::Sender<ServerMessage>,
    room: Option<ShowingId>,
}

#[derive(Default)]
struct Registry {
    connections: HashMap<ConnectionId, Outbox>,
    rooms: HashMap<ShowingId, HashMap<ConnectionId, ViewerId>>,
}

impl Registry {
    fn leave_room(&mut self, connection_id: ConnectionId) -> Option<(ShowingId, ViewerId)> {
        let showing_id = self.connections.get_mut(&connection_id)?.room.take()?;
        let room = self.rooms.get_mut(&showing_id)?;
        let viewer_id = room.remove(&connection_id);
        if room.is_empty() {
            self.rooms.remove(&showing_id);
        }
        viewer_id.map(|viewer_id| (showing_id, viewer_id))
    }
}

/// Fans seat snapshots out to every connection watching a showing.
///
/// Each connection owns a bounded outbox drained by its own writer task.
/// Delivery uses `try_send`, so a full or dead outbox never holds up the
/// rest of the room. Publishes for one showing are serialized, which keeps
/// the order of snapshots the same for every subscriber.
pub struct BroadcastHub {
    seats: Arc<dyn SeatStore>,
    outbox_capacity: usize,
    registry: Mutex<Registry>,
    publish_locks: Mutex<HashMap<ShowingId, Arc<AsyncMutex<()>>>>,
}

impl BroadcastHub {
    pub fn new(seats: Arc<dyn SeatStore>, outbox_capacity: usize) -> Self {
        Self {
            seats,
            outbox_capacity: outbox_capacity.max(1),
            registry: Mutex::new(Registry::default()),
            publish_locks: Mutex::new(HashMap::new()),
        }
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish_lock(&self, showing_id: ShowingId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.publish_locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(showing_id).or_default().clone()
    }

    /// Registers a connection and hands back the receiving end of its outbox.
    pub fn connect(&self, connection_id: ConnectionId) -> mpsc::Receiver<ServerMessage> {
        let (sender, receiver) = mpsc::channel(self.outbox_capacity);
        self.registry().connections.insert(connection_id, Outbox { sender, room: None });
        receiver
    }

    /// Forgets a connection entirely, dropping its outbox.
    pub fn disconnect(&self, connection_id: ConnectionId) -> Option<(ShowingId, ViewerId)> {
        let mut registry = self.registry();
        let left = registry.leave_room(connection_id);
        registry.connections.remove(&connection_id);
        left
    }

    /// Moves a connection into the room of `showing_id` and sends it the
    /// current snapshot before any later publish for that showing.
    ///
    /// Returns the room the connection was in before, if any.
    pub async fn subscribe(
        &self,
        connection_id: ConnectionId,
        showing_id: ShowingId,
        viewer_id: ViewerId,
    ) -> Option<ShowingId> {
        let lock = self.publish_lock(showing_id);
        let _ordered = lock.lock().await;

        let previous = {
            let mut registry = self.registry();
            if !registry.connections.contains_key(&connection_id) {
                warn!(connection = %connection_id, "subscribe for unknown connection");
                return None;
            }
            let previous = registry.leave_room(connection_id).map(|(showing, _)| showing);
            registry
                .rooms
                .entry(showing_id)
                .or_default()
                .insert(connection_id, viewer_id.clone());
            if let Some(outbox) = registry.connections.get_mut(&connection_id) {
                outbox.room = Some(showing_id);
            }
            previous
        };

        match self.seats.get_seats(showing_id).await {
            Ok(seats) => {
                let snapshot = SeatSnapshot::personalized(showing_id, &seats, Some(&viewer_id));
                self.send_to(connection_id, ServerMessage::SeatsUpdated(snapshot));
            }
            Err(e) => error!(showing = %showing_id, error = %e, "failed to read initial snapshot"),
        }
        previous
    }

    /// Takes a connection out of its room. It keeps its outbox.
    pub fn unsubscribe(&self, connection_id: ConnectionId) -> Option<(ShowingId, ViewerId)> {
        self.registry().leave_room(connection_id)
    }

    /// Reads a fresh snapshot and pushes it, personalized, to every
    /// subscriber of the showing.
    pub async fn publish(&self, showing_id: ShowingId) {
        let lock = self.publish_lock(showing_id);
        let _ordered = lock.lock().await;

        let seats = match self.seats.get_seats(showing_id).await {
            Ok(seats) => seats,
            Err(e) => {
                error!(showing = %showing_id, error = %e, "failed to read snapshot for publish");
                return;
            }
        };

        let targets: Vec<(ConnectionId, ViewerId, mpsc::Sender<ServerMessage>)> = {
            let registry = self.registry();
            let Some(room) = registry.rooms.get(&showing_id) else {
                return;
            };
            room.iter()
                .filter_map(|(connection_id, viewer_id)| {
                    registry
                        .connections
                        .get(connection_id)
                        .map(|outbox| (*connection_id, viewer_id.clone(), outbox.sender.clone()))
                })
                .collect()
        };

        let mut dead = Vec::new();
        for (connection_id, viewer_id, sender) in targets {
            let snapshot = SeatSnapshot::personalized(showing_id, &seats, Some(&viewer_id));
            if !deliver(connection_id, &sender, ServerMessage::SeatsUpdated(snapshot)) && sender.is_closed() {
                dead.push(connection_id);
            }
        }
        self.prune(dead);
    }

    /// Sends a message to one connection. Returns false if it was dropped.
    pub fn send_to(&self, connection_id: ConnectionId, message: ServerMessage) -> bool {
        let sender = self
            .registry()
            .connections
            .get(&connection_id)
            .map(|outbox| outbox.sender.clone());
        let Some(sender) = sender else {
            return false;
        };
        let delivered = deliver(connection_id, &sender, message);
        if !delivered && sender.is_closed() {
            self.prune(vec![connection_id]);
        }
        delivered
    }

    /// Sends the same message to every subscriber of a showing except one.
    pub fn send_to_room_except(&self, showing_id: ShowingId, except: ConnectionId, message: ServerMessage) {
        let targets: Vec<(ConnectionId, mpsc::Sender<ServerMessage>)> = {
            let registry = self.registry();
            let Some(room) = registry.rooms.get(&showing_id) else {
                return;
            };
            room.keys()
                .filter(|connection_id| **connection_id != except)
                .filter_map(|connection_id| {
                    registry
                        .connections
                        .get(connection_id)
                        .map(|outbox| (*connection_id, outbox.sender.clone()))
                })
                .collect()
        };

        let mut dead = Vec::new();
        for (connection_id, sender) in targets {
            if !deliver(connection_id, &sender, message.clone()) && sender.is_closed() {
                dead.push(connection_id);
            }
        }
        self.prune(dead);
    }

    /// Tells every subscriber that a showing is gone and empties its room.
    pub fn close_room(&self, showing_id: ShowingId) -> Vec<ConnectionId> {
        let members: Vec<ConnectionId> = {
            let mut registry = self.registry();
            let members: Vec<ConnectionId> = registry
                .rooms
                .remove(&showing_id)
                .map(|room| room.into_keys().collect())
                .unwrap_or_default();
            for connection_id in &members {
                if let Some(outbox) = registry.connections.get_mut(connection_id) {
                    outbox.room = None;
                }
            }
            members
        };
        for connection_id in &members {
            self.send_to(*connection_id, ServerMessage::ShowingRemoved { showing_id });
        }
        self.publish_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&showing_id);
        members
    }

    pub fn subscriber_count(&self, showing_id: ShowingId) -> usize {
        self.registry().rooms.get(&showing_id).map_or(0, |room| room.len())
    }

    pub fn connection_count(&self) -> usize {
        self.registry().connections.len()
    }

    fn prune(&self, dead: Vec<ConnectionId>) {
        if dead.is_empty() {
            return;
        }
        let mut registry = self.registry();
        for connection_id in dead {
            registry.leave_room(connection_id);
            registry.connections.remove(&connection_id);
            debug!(connection = %connection_id, "dropped closed connection");
        }
    }
}

/// Returns false when the message did not make it into the outbox.
fn deliver(connection_id: ConnectionId, sender: &mpsc::Sender<ServerMessage>, message: ServerMessage) -> bool {
    match sender.try_send(message) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!(connection = %connection_id, "outbox full, dropping message");
            false
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

#[async_trait]
impl SeatNotifier for BroadcastHub {
    async fn notify(&self, showing_id: ShowingId) {
        self.publish(showing_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use marquee_domain::{SeatLabel, SeatState, SeatStatus};
    use marquee_store::MemorySeatStore;

    const SHOWING: ShowingId = ShowingId(1);

    fn label(s: &str) -> SeatLabel {
        s.parse().unwrap()
    }

    async fn hub_with_seats(capacity: usize) -> (BroadcastHub, Arc<MemorySeatStore>) {
        let store = Arc::new(MemorySeatStore::new());
        store.create_seats(SHOWING, &[label("A1"), label("A2")]).await.unwrap();
        (BroadcastHub::new(store.clone(), capacity), store)
    }

    fn expect_snapshot(message: ServerMessage) -> SeatSnapshot {
        match message {
            ServerMessage::SeatsUpdated(snapshot) => snapshot,
            other => panic!("expected snapshot, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_subscribe_sends_initial_snapshot() {
        let (hub, _) = hub_with_seats(8).await;
        let conn = ConnectionId::new();
        let mut rx = hub.connect(conn);

        assert_eq!(hub.subscribe(conn, SHOWING, ViewerId::from("v1")).await, None);
        let snapshot = expect_snapshot(rx.try_recv().unwrap());
        assert_eq!(snapshot.seats.len(), 2);
        assert_eq!(hub.subscriber_count(SHOWING), 1);
    }

    #[tokio::test]
    async fn test_publish_reaches_everyone_personalized() {
        let (hub, store) = hub_with_seats(8).await;
        let (c1, c2) = (ConnectionId::new(), ConnectionId::new());
        let mut rx1 = hub.connect(c1);
        let mut rx2 = hub.connect(c2);
        hub.subscribe(c1, SHOWING, ViewerId::from("v1")).await;
        hub.subscribe(c2, SHOWING, ViewerId::from("v2")).await;
        rx1.try_recv().unwrap();
        rx2.try_recv().unwrap();

        let held = SeatState::held(ViewerId::from("v1"), Utc::now());
        store
            .compare_and_set(SHOWING, label("A1"), &SeatState::Available, &held)
            .await
            .unwrap();
        hub.publish(SHOWING).await;

        let mine = expect_snapshot(rx1.try_recv().unwrap());
        let theirs = expect_snapshot(rx2.try_recv().unwrap());
        assert_eq!(mine.seats[0].holder_id, Some(ViewerId::from("v1")));
        assert_eq!(theirs.seats[0].holder_id, None);
        assert_eq!(theirs.seats[0].state, SeatStatus::Held);
    }

    #[tokio::test]
    async fn test_full_outbox_does_not_block_others() {
        let (hub, _) = hub_with_seats(1).await;
        let (slow, fast) = (ConnectionId::new(), ConnectionId::new());
        let _slow_rx = hub.connect(slow);
        let mut fast_rx = hub.connect(fast);
        hub.subscribe(slow, SHOWING, ViewerId::from("slow")).await;
        hub.subscribe(fast, SHOWING, ViewerId::from("fast")).await;
        fast_rx.try_recv().unwrap();

        // Both outboxes hold one message after the first publish, so the
        // second one is dropped for both.
        hub.publish(SHOWING).await;
        hub.publish(SHOWING).await;

        assert!(fast_rx.try_recv().is_ok());
        assert!(fast_rx.try_recv().is_err());
        hub.publish(SHOWING).await;
        assert!(fast_rx.try_recv().is_ok());
        assert_eq!(hub.subscriber_count(SHOWING), 2);
    }

    #[tokio::test]
    async fn test_closed_connection_is_pruned() {
        let (hub, _) = hub_with_seats(4).await;
        let conn = ConnectionId::new();
        let rx = hub.connect(conn);
        hub.subscribe(conn, SHOWING, ViewerId::from("v1")).await;
        drop(rx);

        hub.publish(SHOWING).await;
        assert_eq!(hub.subscriber_count(SHOWING), 0);
        assert_eq!(hub.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_resubscribe_moves_rooms() {
        let (hub, store) = hub_with_seats(8).await;
        store.create_seats(ShowingId(2), &[label("A1")]).await.unwrap();
        let conn = ConnectionId::new();
        let _rx = hub.connect(conn);

        hub.subscribe(conn, SHOWING, ViewerId::from("v1")).await;
        let previous = hub.subscribe(conn, ShowingId(2), ViewerId::from("v1")).await;
        assert_eq!(previous, Some(SHOWING));
        assert_eq!(hub.subscriber_count(SHOWING), 0);
        assert_eq!(hub.subscriber_count(ShowingId(2)), 1);

        assert_eq!(hub.unsubscribe(conn), Some((ShowingId(2), ViewerId::from("v1"))));
        assert_eq!(hub.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_room_messages_skip_sender_and_close_room() {
        let (hub, _) = hub_with_seats(8).await;
        let (c1, c2) = (ConnectionId::new(), ConnectionId::new());
        let mut rx1 = hub.connect(c1);
        let mut rx2 = hub.connect(c2);
        hub.subscribe(c1, SHOWING, ViewerId::from("v1")).await;
        hub.subscribe(c2, SHOWING, ViewerId::from("v2")).await;
        rx1.try_recv().unwrap();
        rx2.try_recv().unwrap();

        let notice = ServerMessage::ViewerJoined { presence_id: c2 };
        hub.send_to_room_except(SHOWING, c2, notice.clone());
        assert_eq!(rx1.try_recv().unwrap(), notice);
        assert!(rx2.try_recv().is_err());

        let closed = hub.close_room(SHOWING);
        assert_eq!(closed.len(), 2);
        assert_eq!(rx1.try_recv().unwrap(), ServerMessage::ShowingRemoved { showing_id: SHOWING });
        assert_eq!(hub.subscriber_count(SHOWING), 0);
    }
}
