use serde::{Deserialize, Serialize};

use crate::booking::BookingConfirmation;
use crate::seat::{Seat, SeatLabel, SeatStatus};
use crate::showing::ShowingId;
use crate::viewer::{ConnectionId, ViewerId};

/// One seat as a particular viewer sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatView {
    pub seat_label: SeatLabel,
    pub state: SeatStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holder_id: Option<ViewerId>,
}

/// The authoritative seat map of a showing, rendered for one viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatSnapshot {
    pub showing_id: ShowingId,
    pub seats: Vec<SeatView>,
}

impl SeatSnapshot {
    /// Builds the snapshot a viewer receives. Holder ids are only revealed on
    /// that viewer's own holds.
    pub fn personalized(showing_id: ShowingId, seats: &[Seat], viewer: Option<&ViewerId>) -> Self {
        let seats = seats
            .iter()
            .map(|seat| {
                let holder_id = match (seat.state.holder_id(), viewer) {
                    (Some(holder), Some(viewer)) if holder == viewer => Some(holder.clone()),
                    _ => None,
                };
                SeatView {
                    seat_label: seat.label,
                    state: seat.state.status(),
                    holder_id,
                }
            })
            .collect();
        Self { showing_id, seats }
    }

    pub fn status_of(&self, label: &SeatLabel) -> Option<SeatStatus> {
        self.seats
            .iter()
            .find(|view| &view.seat_label == label)
            .map(|view| view.state)
    }
}

/// Messages pushed to a connected client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    Attached {
        showing_id: ShowingId,
    },
    SeatsUpdated(SeatSnapshot),
    SeatError {
        code: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        seat_label: Option<SeatLabel>,
    },
    BookingConfirmed(BookingConfirmation),
    /// Presence notices carry the connection id only, never a viewer id,
    /// so watchers cannot tie a held seat to its holder.
    ViewerJoined {
        presence_id: ConnectionId,
    },
    ViewerLeft {
        presence_id: ConnectionId,
    },
    ShowingRemoved {
        showing_id: ShowingId,
    },
}

/// Messages a client sends over its connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    Join { showing_id: ShowingId },
    Hold { seat_label: String },
    Release { seat_label: String },
    Book { seat_labels: Vec<String> },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seat::SeatState;
    use chrono::Utc;

    fn seat(label: &str, state: SeatState) -> Seat {
        Seat {
            showing_id: ShowingId(7),
            label: label.parse().unwrap(),
            state,
        }
    }

    #[test]
    fn test_snapshot_only_reveals_own_holds() {
        let now = Utc::now();
        let me = ViewerId::from("me");
        let seats = vec![
            seat("A1", SeatState::held(me.clone(), now)),
            seat("A2", SeatState::held(ViewerId::from("other"), now)),
            seat("A3", SeatState::Booked),
        ];

        let snapshot = SeatSnapshot::personalized(ShowingId(7), &seats, Some(&me));
        assert_eq!(snapshot.seats[0].holder_id, Some(me));
        assert_eq!(snapshot.seats[1].holder_id, None);
        assert_eq!(snapshot.seats[1].state, SeatStatus::Held);
        assert_eq!(snapshot.status_of(&"A3".parse().unwrap()), Some(SeatStatus::Booked));

        let anonymous = SeatSnapshot::personalized(ShowingId(7), &seats, None);
        assert!(anonymous.seats.iter().all(|view| view.holder_id.is_none()));
    }

    #[test]
    fn test_snapshot_wire_shape() {
        let seats = vec![seat("B4", SeatState::Available)];
        let message = ServerMessage::SeatsUpdated(SeatSnapshot::personalized(ShowingId(7), &seats, None));
        let json = serde_json::to_value(&message).unwrap();

        assert_eq!(json["type"], "seats_updated");
        assert_eq!(json["showingId"], 7);
        assert_eq!(json["seats"][0]["seatLabel"], "B4");
        assert_eq!(json["seats"][0]["state"], "available");
        assert!(json["seats"][0].get("holderId").is_none());
    }

    #[test]
    fn test_presence_notice_hides_viewer() {
        let presence_id = ConnectionId::new();
        let json = serde_json::to_value(ServerMessage::ViewerJoined { presence_id }).unwrap();

        assert_eq!(json["type"], "viewer_joined");
        assert_eq!(json["presenceId"], presence_id.to_string());
        assert!(json.get("viewerId").is_none());
    }

    #[test]
    fn test_client_message_parsing() {
        let hold: ClientMessage = serde_json::from_str(r#"{"type":"hold","seatLabel":"C3"}"#).unwrap();
        assert_eq!(hold, ClientMessage::Hold { seat_label: "C3".to_string() });

        let book: ClientMessage =
            serde_json::from_str(r#"{"type":"book","seatLabels":["A1","A2"]}"#).unwrap();
        assert!(matches!(book, ClientMessage::Book { seat_labels } if seat_labels.len() == 2));

        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"dance"}"#).is_err());
    }
}
