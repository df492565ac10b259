use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};

use crate::{
    models::{StreamId, ViewerId, ViewerRecord, ViewerRecordId},
    Error, Result,
};

/// Persistent store for viewer presence records.
///
/// Implementations own id assignment and enforce that only the viewer who
/// created a record can close it, and only once.
#[async_trait]
pub trait ViewerStore: Send + Sync {
    /// Insert a new open presence record and return it with its assigned id
    async fn insert_viewer(&self, stream_id: &StreamId, viewer_id: &ViewerId)
        -> Result<ViewerRecord>;

    /// Set `left_at` on a record owned by `viewer_id` that is still open
    async fn mark_left(
        &self,
        record_id: &ViewerRecordId,
        viewer_id: &ViewerId,
        left_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Number of viewers currently present on a stream
    async fn active_viewer_count(&self, stream_id: &StreamId) -> Result<i64>;
}

/// Postgres-backed presence records (`stream_viewers` table)
#[derive(Clone)]
pub struct ViewerRepository {
    pool: PgPool,
}

impl ViewerRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a record by id
    pub async fn get(&self, record_id: &ViewerRecordId) -> Result<Option<ViewerRecord>> {
        let row = sqlx::query(
            "SELECT id, stream_id, viewer_id, joined_at, left_at
             FROM stream_viewers
             WHERE id = $1",
        )
        .bind(record_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_record).transpose()
    }

    fn row_to_record(row: PgRow) -> Result<ViewerRecord> {
        Ok(ViewerRecord {
            id: row.try_get("id")?,
            stream_id: row.try_get("stream_id")?,
            viewer_id: row.try_get("viewer_id")?,
            joined_at: row.try_get("joined_at")?,
            left_at: row.try_get("left_at")?,
        })
    }
}

#[async_trait]
impl ViewerStore for ViewerRepository {
    async fn insert_viewer(
        &self,
        stream_id: &StreamId,
        viewer_id: &ViewerId,
    ) -> Result<ViewerRecord> {
        let record = ViewerRecord::new(ViewerRecordId::new(), stream_id.clone(), viewer_id.clone());

        let row = sqlx::query(
            "INSERT INTO stream_viewers (id, stream_id, viewer_id, joined_at)
             VALUES ($1, $2, $3, $4)
             RETURNING id, stream_id, viewer_id, joined_at, left_at",
        )
        .bind(&record.id)
        .bind(&record.stream_id)
        .bind(&record.viewer_id)
        .bind(record.joined_at)
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_record(row)
    }

    async fn mark_left(
        &self,
        record_id: &ViewerRecordId,
        viewer_id: &ViewerId,
        left_at: DateTime<Utc>,
    ) -> Result<()> {
        // Ownership and set-once are both part of the predicate
        let result = sqlx::query(
            "UPDATE stream_viewers
             SET left_at = $3
             WHERE id = $1 AND viewer_id = $2 AND left_at IS NULL",
        )
        .bind(record_id)
        .bind(viewer_id)
        .bind(left_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!(
                "No open presence record {record_id} for this viewer"
            )));
        }

        Ok(())
    }

    async fn active_viewer_count(&self, stream_id: &StreamId) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT viewer_id)
             FROM stream_viewers
             WHERE stream_id = $1 AND left_at IS NULL",
        )
        .bind(stream_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}
