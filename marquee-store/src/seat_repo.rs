use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use marquee_domain::repository::{CasOutcome, SeatStore, StoreError, StoreResult};
use marquee_domain::{Seat, SeatLabel, SeatState, SeatStatus, SeatTransition, ShowingId, ViewerId};

pub struct PgSeatStore {
    pool: PgPool,
}

impl PgSeatStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct SeatRow {
    showing_id: i64,
    seat_label: String,
    state: String,
    holder_id: Option<String>,
    hold_expires_at: Option<DateTime<Utc>>,
}

impl TryFrom<SeatRow> for Seat {
    type Error = StoreError;

    fn try_from(row: SeatRow) -> Result<Self, Self::Error> {
        let label: SeatLabel = row
            .seat_label
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("{}: {}", row.seat_label, e)))?;
        let status: SeatStatus = row.state.parse().map_err(StoreError::Corrupt)?;
        let state = match (status, row.holder_id, row.hold_expires_at) {
            (SeatStatus::Available, _, _) => SeatState::Available,
            (SeatStatus::Booked, _, _) => SeatState::Booked,
            (SeatStatus::Held, Some(holder), Some(expires_at)) => SeatState::Held {
                holder_id: ViewerId::from(holder),
                expires_at,
            },
            (SeatStatus::Held, _, _) => {
                return Err(StoreError::Corrupt(format!(
                    "seat {} of showing {} is held without holder or expiry",
                    label, row.showing_id
                )))
            }
        };
        Ok(Seat {
            showing_id: ShowingId(row.showing_id),
            label,
            state,
        })
    }
}

/// Column values for a seat state: (state, holder_id, hold_expires_at).
fn columns(state: &SeatState) -> (&'static str, Option<&str>, Option<DateTime<Utc>>) {
    (
        state.status().as_str(),
        state.holder_id().map(|h| h.as_str()),
        state.hold_expires_at(),
    )
}

const SELECT_SEATS: &str = r#"
    SELECT showing_id, seat_label, state, holder_id, hold_expires_at
    FROM seats
    WHERE showing_id = $1
    ORDER BY seat_row, seat_column
"#;

const CONDITIONAL_UPDATE: &str = r#"
    UPDATE seats
    SET state = $3, holder_id = $4, hold_expires_at = $5
    WHERE showing_id = $1
      AND seat_label = $2
      AND state = $6
      AND holder_id IS NOT DISTINCT FROM $7
"#;

async fn apply_transition(
    tx: &mut Transaction<'_, Postgres>,
    showing_id: ShowingId,
    label: SeatLabel,
    expected: &SeatState,
    next: &SeatState,
) -> Result<bool, sqlx::Error> {
    let (next_state, next_holder, next_expiry) = columns(next);
    let (expected_state, expected_holder, _) = columns(expected);
    let result = sqlx::query(CONDITIONAL_UPDATE)
        .bind(showing_id.0)
        .bind(label.to_string())
        .bind(next_state)
        .bind(next_holder)
        .bind(next_expiry)
        .bind(expected_state)
        .bind(expected_holder)
        .execute(&mut **tx)
        .await?;
    Ok(result.rows_affected() == 1)
}

impl PgSeatStore {
    /// Tells a conflicting seat apart from one that does not exist.
    async fn classify_miss(&self, showing_id: ShowingId, label: SeatLabel) -> StoreResult<CasOutcome> {
        let exists: Option<i32> =
            sqlx::query_scalar("SELECT 1 FROM seats WHERE showing_id = $1 AND seat_label = $2")
                .bind(showing_id.0)
                .bind(label.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(StoreError::backend)?;
        Ok(match exists {
            Some(_) => CasOutcome::Conflict(label),
            None => CasOutcome::Missing(label),
        })
    }
}

#[async_trait]
impl SeatStore for PgSeatStore {
    async fn create_seats(&self, showing_id: ShowingId, labels: &[SeatLabel]) -> StoreResult<()> {
        let names: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
        let rows: Vec<i16> = labels.iter().map(|l| i16::from(l.row_index())).collect();
        let cols: Vec<i32> = labels.iter().map(|l| i32::from(l.column())).collect();

        sqlx::query(
            r#"
            INSERT INTO seats (showing_id, seat_label, seat_row, seat_column)
            SELECT $1, label, seat_row, seat_column
            FROM UNNEST($2::text[], $3::smallint[], $4::int[]) AS grid(label, seat_row, seat_column)
            ON CONFLICT (showing_id, seat_label) DO NOTHING
            "#,
        )
        .bind(showing_id.0)
        .bind(names)
        .bind(rows)
        .bind(cols)
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        Ok(())
    }

    async fn remove_seats(&self, showing_id: ShowingId) -> StoreResult<()> {
        sqlx::query("DELETE FROM seats WHERE showing_id = $1")
            .bind(showing_id.0)
            .execute(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        Ok(())
    }

    async fn get_seats(&self, showing_id: ShowingId) -> StoreResult<Vec<Seat>> {
        let rows: Vec<SeatRow> = sqlx::query_as(SELECT_SEATS)
            .bind(showing_id.0)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        rows.into_iter().map(Seat::try_from).collect()
    }

    async fn get_seat(&self, showing_id: ShowingId, label: SeatLabel) -> StoreResult<Option<Seat>> {
        let row: Option<SeatRow> = sqlx::query_as(
            r#"
            SELECT showing_id, seat_label, state, holder_id, hold_expires_at
            FROM seats
            WHERE showing_id = $1 AND seat_label = $2
            "#,
        )
        .bind(showing_id.0)
        .bind(label.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        row.map(Seat::try_from).transpose()
    }

    async fn compare_and_set(
        &self,
        showing_id: ShowingId,
        label: SeatLabel,
        expected: &SeatState,
        next: &SeatState,
    ) -> StoreResult<CasOutcome> {
        let mut tx = self.pool.begin().await.map_err(StoreError::backend)?;
        let applied = apply_transition(&mut tx, showing_id, label, expected, next)
            .await
            .map_err(StoreError::backend)?;
        tx.commit().await.map_err(StoreError::backend)?;

        if applied {
            Ok(CasOutcome::Applied)
        } else {
            self.classify_miss(showing_id, label).await
        }
    }

    async fn compare_and_set_all(
        &self,
        showing_id: ShowingId,
        transitions: &[SeatTransition],
    ) -> StoreResult<CasOutcome> {
        let mut tx = self.pool.begin().await.map_err(StoreError::backend)?;
        for t in transitions {
            let applied = apply_transition(&mut tx, showing_id, t.label, &t.expected, &t.next)
                .await
                .map_err(StoreError::backend)?;
            if !applied {
                tx.rollback().await.map_err(StoreError::backend)?;
                return self.classify_miss(showing_id, t.label).await;
            }
        }
        tx.commit().await.map_err(StoreError::backend)?;
        Ok(CasOutcome::Applied)
    }

    async fn showings_with_holds(&self) -> StoreResult<Vec<ShowingId>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT DISTINCT showing_id FROM seats WHERE state = 'held' ORDER BY showing_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        Ok(ids.into_iter().map(ShowingId).collect())
    }

    async fn release_all_holds(&self) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE seats
            SET state = 'available', holder_id = NULL, hold_expires_at = NULL
            WHERE state = 'held'
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        Ok(result.rows_affected())
    }
}
