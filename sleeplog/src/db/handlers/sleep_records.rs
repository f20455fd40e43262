//! Database repository for sleep records.
//!
//! A [`SleepRecords`] repository is opened for exactly one owner. Every statement it issues
//! carries `user_id = owner`, so a record belonging to someone else behaves exactly like a
//! record that does not exist: it is absent from listings, `get_by_id` returns `None`, and
//! updates and deletes report nothing found.

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::instrument;

use crate::db::errors::Result;
use crate::db::handlers::repository::Repository;
use crate::db::models::sleep_records::{
    SleepRecordCreateDBRequest, SleepRecordDBResponse, SleepRecordFilter, SleepRecordUpdateDBRequest,
};
use crate::types::{SleepRecordId, UserId};

/// Repository for one user's sleep records.
pub struct SleepRecords<'c> {
    db: &'c mut SqliteConnection,
    owner: UserId,
}

impl<'c> SleepRecords<'c> {
    pub fn new(db: &'c mut SqliteConnection, owner: UserId) -> Self {
        Self { db, owner }
    }

    /// Number of records the owner has logged.
    #[instrument(skip(self), fields(user_id = self.owner), err)]
    pub async fn count(&mut self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM sleep_records WHERE user_id = ?")
            .bind(self.owner)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(count)
    }
}

#[async_trait::async_trait]
impl<'c> Repository for SleepRecords<'c> {
    type CreateRequest = SleepRecordCreateDBRequest;
    type UpdateRequest = SleepRecordUpdateDBRequest;
    type Response = SleepRecordDBResponse;
    type Id = SleepRecordId;
    type Filter = SleepRecordFilter;

    #[instrument(skip(self, request), fields(date = %request.date), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let record = sqlx::query_as::<_, SleepRecordDBResponse>(
            r#"
            INSERT INTO sleep_records (user_id, date, sleep_time, wake_time, notes, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            RETURNING *
            "#,
        )
        .bind(self.owner)
        .bind(request.date)
        .bind(&request.sleep_time)
        .bind(&request.wake_time)
        .bind(request.notes.as_deref())
        .bind(Utc::now())
        .fetch_one(&mut *self.db)
        .await?;

        Ok(record)
    }

    #[instrument(skip(self), fields(record_id = id), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let record = sqlx::query_as::<_, SleepRecordDBResponse>("SELECT * FROM sleep_records WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(self.owner)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(record)
    }

    /// Records ordered by night, oldest first. Same-night records keep insertion order.
    #[instrument(skip(self, filter), fields(from = ?filter.from, to = ?filter.to), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let records = sqlx::query_as::<_, SleepRecordDBResponse>(
            r#"
            SELECT * FROM sleep_records
            WHERE user_id = ?1
              AND (?2 IS NULL OR date >= ?2)
              AND (?3 IS NULL OR date <= ?3)
            ORDER BY date ASC, id ASC
            "#,
        )
        .bind(self.owner)
        .bind(filter.from)
        .bind(filter.to)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(records)
    }

    #[instrument(skip(self), fields(record_id = id), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sleep_records WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(self.owner)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(record_id = id), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let record = sqlx::query_as::<_, SleepRecordDBResponse>(
            r#"
            UPDATE sleep_records
            SET
                date = COALESCE(?3, date),
                sleep_time = COALESCE(?4, sleep_time),
                wake_time = COALESCE(?5, wake_time),
                notes = CASE WHEN ?6 THEN ?7 ELSE notes END,
                updated_at = ?8
            WHERE id = ?1 AND user_id = ?2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(self.owner)
        .bind(request.date)
        .bind(request.sleep_time.as_deref())
        .bind(request.wake_time.as_deref())
        .bind(request.notes.is_some())
        .bind(request.notes.clone().flatten())
        .bind(Utc::now())
        .fetch_one(&mut *self.db)
        .await?;

        Ok(record)
    }
}
