use crate::error::PipelineError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{PlateRecord, PlateStore, PlateText};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{info, warn};

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS plate_records (
    plate_text TEXT PRIMARY KEY,
    slot_id INTEGER NOT NULL,
    first_seen TIMESTAMPTZ NOT NULL
)
"#;

type PlateRow = (String, i32, DateTime<Utc>);

pub struct PgPlateStore {
    pool: PgPool,
}

impl PgPlateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open the pool, ping the server and make sure the table exists.
    ///
    /// Every step is bounded by `timeout`; any failure is a connection error.
    pub async fn connect(database_url: &str, timeout: Duration) -> Result<Self, PipelineError> {
        let setup = async {
            let pool = PgPoolOptions::new()
                .max_connections(2)
                .acquire_timeout(timeout)
                .connect(database_url)
                .await
                .context("Failed to connect to plate database")?;

            sqlx::query("SELECT 1")
                .execute(&pool)
                .await
                .context("Plate database did not answer ping")?;

            sqlx::query(CREATE_TABLE)
                .execute(&pool)
                .await
                .context("Failed to create plate_records table")?;

            Ok::<_, anyhow::Error>(pool)
        };

        let pool = tokio::time::timeout(timeout, setup)
            .await
            .map_err(|_| {
                PipelineError::Connection(format!(
                    "plate database not reachable within {}s",
                    timeout.as_secs_f32()
                ))
            })?
            .map_err(|e| PipelineError::Connection(format!("{:#}", e)))?;

        info!("Connected to plate database");
        Ok(Self::new(pool))
    }

    fn row_to_record(row: PlateRow) -> Result<PlateRecord> {
        let (text, slot_id, first_seen) = row;
        let normalized_text = PlateText::from_canonical(text.as_str())
            .with_context(|| format!("stored plate {:?} is not canonical", text))?;
        let slot_id = u32::try_from(slot_id)
            .with_context(|| format!("stored slot {} for {} is negative", slot_id, text))?;

        Ok(PlateRecord {
            normalized_text,
            slot_id,
            first_seen,
        })
    }
}

#[async_trait]
impl PlateStore for PgPlateStore {
    async fn find(&self, plate: &PlateText) -> Result<Option<PlateRecord>> {
        let row: Option<PlateRow> = sqlx::query_as(
            "SELECT plate_text, slot_id, first_seen FROM plate_records WHERE plate_text = $1",
        )
        .bind(plate.as_str())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to look up plate")?;

        row.map(Self::row_to_record).transpose()
    }

    async fn upsert(&self, record: &PlateRecord) -> Result<bool> {
        let slot_id = i32::try_from(record.slot_id).context("slot id does not fit in INTEGER")?;

        let result = sqlx::query(
            r#"
            INSERT INTO plate_records (plate_text, slot_id, first_seen)
            VALUES ($1, $2, $3)
            ON CONFLICT (plate_text) DO NOTHING
            "#,
        )
        .bind(record.normalized_text.as_str())
        .bind(slot_id)
        .bind(record.first_seen)
        .execute(&self.pool)
        .await
        .context("Failed to insert plate")?;

        Ok(result.rows_affected() == 1)
    }

    async fn list(&self) -> Result<Vec<PlateRecord>> {
        let rows: Vec<PlateRow> = sqlx::query_as(
            "SELECT plate_text, slot_id, first_seen FROM plate_records ORDER BY first_seen",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list plates")?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            match Self::row_to_record(row) {
                Ok(record) => records.push(record),
                Err(e) => warn!("skipping unreadable plate row: {:#}", e),
            }
        }
        Ok(records)
    }

    async fn health_check(&self) -> Result<bool> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| true)
            .or(Ok(false))
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        info!("Plate database connection closed");
        Ok(())
    }
}
