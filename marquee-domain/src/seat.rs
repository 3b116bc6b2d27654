use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::showing::ShowingId;
use crate::viewer::ViewerId;

/// How long a hold survives without being booked or released.
pub const HOLD_TTL_SECONDS: i64 = 300;

pub fn hold_ttl() -> Duration {
    Duration::seconds(HOLD_TTL_SECONDS)
}

/// Row letter + column number, e.g. `A5` or `J10`.
///
/// Ordering is by row, then column, so `A2 < A10 < B1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SeatLabel {
    row: char,
    column: u16,
}

impl SeatLabel {
    pub const MAX_ROWS: u8 = 26;

    pub fn new(row: char, column: u16) -> Result<Self, SeatLabelError> {
        let row = row.to_ascii_uppercase();
        if !row.is_ascii_uppercase() {
            return Err(SeatLabelError::InvalidRow(row));
        }
        if column == 0 {
            return Err(SeatLabelError::InvalidColumn);
        }
        Ok(Self { row, column })
    }

    /// Label for a zero-based row index and one-based column.
    pub fn from_grid(row_index: u8, column: u16) -> Result<Self, SeatLabelError> {
        if row_index >= Self::MAX_ROWS {
            return Err(SeatLabelError::RowOutOfRange(row_index));
        }
        Self::new(char::from(b'A' + row_index), column)
    }

    pub fn row(&self) -> char {
        self.row
    }

    /// Zero-based row index (`A` = 0).
    pub fn row_index(&self) -> u8 {
        self.row as u8 - b'A'
    }

    pub fn column(&self) -> u16 {
        self.column
    }
}

impl fmt::Display for SeatLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.row, self.column)
    }
}

impl FromStr for SeatLabel {
    type Err = SeatLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut chars = s.chars();
        let row = chars.next().ok_or(SeatLabelError::Empty)?;
        let digits = chars.as_str();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SeatLabelError::Malformed(s.to_string()));
        }
        let column = digits
            .parse::<u16>()
            .map_err(|_| SeatLabelError::Malformed(s.to_string()))?;
        Self::new(row, column)
    }
}

impl TryFrom<String> for SeatLabel {
    type Error = SeatLabelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SeatLabel> for String {
    fn from(label: SeatLabel) -> Self {
        label.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SeatLabelError {
    #[error("seat label is empty")]
    Empty,
    #[error("seat row must be a letter A-Z, got {0:?}")]
    InvalidRow(char),
    #[error("seat row index {0} is out of range")]
    RowOutOfRange(u8),
    #[error("seat column must be at least 1")]
    InvalidColumn,
    #[error("malformed seat label: {0}")]
    Malformed(String),
}

/// Wire-level seat status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatStatus {
    Available,
    Held,
    Booked,
}

impl SeatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatStatus::Available => "available",
            SeatStatus::Held => "held",
            SeatStatus::Booked => "booked",
        }
    }
}

impl FromStr for SeatStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(SeatStatus::Available),
            "held" => Ok(SeatStatus::Held),
            "booked" => Ok(SeatStatus::Booked),
            other => Err(format!("unknown seat status: {}", other)),
        }
    }
}

/// The state of one seat. Holder and expiry only exist while held.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SeatState {
    Available,
    Held {
        holder_id: ViewerId,
        expires_at: DateTime<Utc>,
    },
    Booked,
}

impl SeatState {
    pub fn held(holder_id: ViewerId, now: DateTime<Utc>) -> Self {
        SeatState::Held {
            holder_id,
            expires_at: now + hold_ttl(),
        }
    }

    pub fn status(&self) -> SeatStatus {
        match self {
            SeatState::Available => SeatStatus::Available,
            SeatState::Held { .. } => SeatStatus::Held,
            SeatState::Booked => SeatStatus::Booked,
        }
    }

    pub fn holder_id(&self) -> Option<&ViewerId> {
        match self {
            SeatState::Held { holder_id, .. } => Some(holder_id),
            _ => None,
        }
    }

    pub fn hold_expires_at(&self) -> Option<DateTime<Utc>> {
        match self {
            SeatState::Held { expires_at, .. } => Some(*expires_at),
            _ => None,
        }
    }

    pub fn is_held_by(&self, viewer_id: &ViewerId) -> bool {
        self.holder_id() == Some(viewer_id)
    }

    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        matches!(self, SeatState::Held { expires_at, .. } if now >= *expires_at)
    }

    /// Compare-and-set match: same status and same holder.
    ///
    /// Expiry timestamps are not compared; backends may round them.
    pub fn matches(&self, expected: &SeatState) -> bool {
        self.status() == expected.status() && self.holder_id() == expected.holder_id()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    pub showing_id: ShowingId,
    pub label: SeatLabel,
    #[serde(flatten)]
    pub state: SeatState,
}

impl Seat {
    pub fn available(showing_id: ShowingId, label: SeatLabel) -> Self {
        Self {
            showing_id,
            label,
            state: SeatState::Available,
        }
    }
}

/// One conditional change inside a multi-seat compare-and-set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatTransition {
    pub label: SeatLabel,
    pub expected: SeatState,
    pub next: SeatState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_parsing() {
        let label: SeatLabel = "a10".parse().unwrap();
        assert_eq!(label.row(), 'A');
        assert_eq!(label.column(), 10);
        assert_eq!(label.to_string(), "A10");

        assert!("".parse::<SeatLabel>().is_err());
        assert!("5A".parse::<SeatLabel>().is_err());
        assert!("A".parse::<SeatLabel>().is_err());
        assert!("A0".parse::<SeatLabel>().is_err());
        assert!("A-1".parse::<SeatLabel>().is_err());
    }

    #[test]
    fn test_label_orders_by_row_then_column() {
        let mut labels: Vec<SeatLabel> = ["B1", "A10", "A2", "C3", "A1"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        labels.sort();
        let rendered: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
        assert_eq!(rendered, vec!["A1", "A2", "A10", "B1", "C3"]);
    }

    #[test]
    fn test_label_serializes_as_string() {
        let label = SeatLabel::from_grid(4, 5).unwrap();
        assert_eq!(serde_json::to_string(&label).unwrap(), "\"E5\"");
        let back: SeatLabel = serde_json::from_str("\"E5\"").unwrap();
        assert_eq!(back, label);
        assert!(SeatLabel::from_grid(26, 1).is_err());
    }

    #[test]
    fn test_held_state_carries_holder_and_expiry() {
        let now = Utc::now();
        let viewer = ViewerId::from("viewer-1");
        let state = SeatState::held(viewer.clone(), now);

        assert_eq!(state.status(), SeatStatus::Held);
        assert!(state.is_held_by(&viewer));
        assert_eq!(state.hold_expires_at(), Some(now + hold_ttl()));
        assert!(!state.is_stale(now));
        assert!(state.is_stale(now + hold_ttl()));

        assert_eq!(SeatState::Available.holder_id(), None);
        assert_eq!(SeatState::Booked.hold_expires_at(), None);
    }

    #[test]
    fn test_matches_ignores_expiry() {
        let now = Utc::now();
        let viewer = ViewerId::from("viewer-1");
        let a = SeatState::held(viewer.clone(), now);
        let b = SeatState::held(viewer, now + Duration::seconds(3));
        assert!(a.matches(&b));
        assert!(!a.matches(&SeatState::held(ViewerId::from("viewer-2"), now)));
        assert!(!a.matches(&SeatState::Available));
    }
}
