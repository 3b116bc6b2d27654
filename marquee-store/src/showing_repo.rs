use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use marquee_domain::repository::{ShowingCatalog, ShowingDirectory, StoreError, StoreResult};
use marquee_domain::{Showing, ShowingId};

pub struct PgShowingDirectory {
    pool: PgPool,
}

impl PgShowingDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ShowingRow {
    id: i64,
    title: String,
    price: i64,
    grid_rows: i16,
    grid_columns: i32,
    created_at: DateTime<Utc>,
}

impl TryFrom<ShowingRow> for Showing {
    type Error = StoreError;

    fn try_from(row: ShowingRow) -> Result<Self, Self::Error> {
        let rows = u8::try_from(row.grid_rows)
            .map_err(|_| StoreError::Corrupt(format!("showing {} has {} rows", row.id, row.grid_rows)))?;
        let columns = u16::try_from(row.grid_columns)
            .map_err(|_| StoreError::Corrupt(format!("showing {} has {} columns", row.id, row.grid_columns)))?;
        Ok(Showing {
            id: ShowingId(row.id),
            title: row.title,
            price: row.price,
            rows,
            columns,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl ShowingCatalog for PgShowingDirectory {
    async fn get_showing(&self, showing_id: ShowingId) -> StoreResult<Option<Showing>> {
        let row: Option<ShowingRow> = sqlx::query_as(
            "SELECT id, title, price, grid_rows, grid_columns, created_at FROM showings WHERE id = $1",
        )
        .bind(showing_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        row.map(Showing::try_from).transpose()
    }

    async fn list_showings(&self) -> StoreResult<Vec<Showing>> {
        let rows: Vec<ShowingRow> = sqlx::query_as(
            "SELECT id, title, price, grid_rows, grid_columns, created_at FROM showings ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        rows.into_iter().map(Showing::try_from).collect()
    }
}

#[async_trait]
impl ShowingDirectory for PgShowingDirectory {
    async fn insert_showing(&self, showing: &Showing) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO showings (id, title, price, grid_rows, grid_columns, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(showing.id.0)
        .bind(&showing.title)
        .bind(showing.price)
        .bind(i16::from(showing.rows))
        .bind(i32::from(showing.columns))
        .bind(showing.created_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        Ok(())
    }

    // Seats go with it through ON DELETE CASCADE.
    async fn remove_showing(&self, showing_id: ShowingId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM showings WHERE id = $1")
            .bind(showing_id.0)
            .execute(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        Ok(result.rows_affected() > 0)
    }
}
