use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use marquee_domain::repository::{BookingLedger, StoreError, StoreResult};
use marquee_domain::{Booking, SeatLabel, ShowingId, ViewerId};

pub struct PgBookingLedger {
    pool: PgPool,
}

impl PgBookingLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    showing_id: i64,
    viewer_id: String,
    seat_labels: Vec<String>,
    total_price: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let seat_labels = row
            .seat_labels
            .iter()
            .map(|s| s.parse::<SeatLabel>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::Corrupt(format!("booking {}: {}", row.id, e)))?;
        Ok(Booking {
            id: row.id,
            showing_id: ShowingId(row.showing_id),
            viewer_id: ViewerId::from(row.viewer_id),
            seat_labels,
            total_price: row.total_price,
            created_at: row.created_at,
        })
    }
}

const SELECT_BOOKINGS: &str =
    "SELECT id, showing_id, viewer_id, seat_labels, total_price, created_at FROM bookings";

#[async_trait]
impl BookingLedger for PgBookingLedger {
    async fn append(&self, booking: &Booking) -> StoreResult<()> {
        let labels: Vec<String> = booking.seat_labels.iter().map(|l| l.to_string()).collect();
        sqlx::query(
            r#"
            INSERT INTO bookings (id, showing_id, viewer_id, seat_labels, total_price, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(booking.id)
        .bind(booking.showing_id.0)
        .bind(booking.viewer_id.as_str())
        .bind(labels)
        .bind(booking.total_price)
        .bind(booking.created_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        Ok(())
    }

    async fn bookings_for_viewer(&self, viewer_id: &ViewerId) -> StoreResult<Vec<Booking>> {
        let rows: Vec<BookingRow> =
            sqlx::query_as(&format!("{} WHERE viewer_id = $1 ORDER BY created_at", SELECT_BOOKINGS))
                .bind(viewer_id.as_str())
                .fetch_all(&self.pool)
                .await
                .map_err(StoreError::backend)?;
        rows.into_iter().map(Booking::try_from).collect()
    }

    async fn all_bookings(&self) -> StoreResult<Vec<Booking>> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!("{} ORDER BY created_at", SELECT_BOOKINGS))
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        rows.into_iter().map(Booking::try_from).collect()
    }
}
