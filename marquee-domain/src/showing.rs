use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::seat::SeatLabel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShowingId(pub i64);

impl fmt::Display for ShowingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ShowingId {
    fn from(id: i64) -> Self {
        ShowingId(id)
    }
}

/// One screening. Price and seat grid never change once the showing exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Showing {
    pub id: ShowingId,
    pub title: String,
    /// Price of a single seat in minor currency units.
    pub price: i64,
    pub rows: u8,
    pub columns: u16,
    pub created_at: DateTime<Utc>,
}

impl Showing {
    pub const DEFAULT_ROWS: u8 = 10;
    pub const DEFAULT_COLUMNS: u16 = 10;

    pub fn new(id: ShowingId, title: impl Into<String>, price: i64) -> Self {
        Self {
            id,
            title: title.into(),
            price,
            rows: Self::DEFAULT_ROWS,
            columns: Self::DEFAULT_COLUMNS,
            created_at: Utc::now(),
        }
    }

    pub fn with_grid(mut self, rows: u8, columns: u16) -> Self {
        self.rows = rows;
        self.columns = columns;
        self
    }

    /// Every seat label of the grid, ordered by row then column.
    pub fn seat_labels(&self) -> Vec<SeatLabel> {
        let rows = self.rows.min(SeatLabel::MAX_ROWS);
        (0..rows)
            .flat_map(|row| (1..=self.columns).map(move |column| (row, column)))
            .filter_map(|(row, column)| SeatLabel::from_grid(row, column).ok())
            .collect()
    }

    pub fn has_seat(&self, label: &SeatLabel) -> bool {
        label.row_index() < self.rows && label.column() <= self.columns
    }

    pub fn seat_count(&self) -> usize {
        usize::from(self.rows.min(SeatLabel::MAX_ROWS)) * usize::from(self.columns)
    }
}
