//! Database models for sleep records.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;

use crate::intervals::SleepInterval;
use crate::types::{SleepRecordId, UserId};

/// Database request for logging a night. The owner comes from the repository, not the request.
#[derive(Debug, Clone)]
pub struct SleepRecordCreateDBRequest {
    pub date: NaiveDate,
    pub sleep_time: String,
    pub wake_time: String,
    pub notes: Option<String>,
}

/// Database request for a partial update; `None` leaves the column unchanged.
#[derive(Debug, Clone, Default)]
pub struct SleepRecordUpdateDBRequest {
    pub date: Option<NaiveDate>,
    pub sleep_time: Option<String>,
    pub wake_time: Option<String>,
    /// `Some(None)` clears the notes
    pub notes: Option<Option<String>>,
}

/// Date-range filter for listing records. Both bounds are inclusive.
#[derive(Debug, Clone, Default)]
pub struct SleepRecordFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// Database model for one logged night.
#[derive(Debug, Clone, FromRow)]
pub struct SleepRecordDBResponse {
    pub id: SleepRecordId,
    pub user_id: UserId,
    pub date: NaiveDate,
    pub sleep_time: String,
    pub wake_time: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SleepInterval for SleepRecordDBResponse {
    fn night(&self) -> NaiveDate {
        self.date
    }

    fn sleep_time(&self) -> &str {
        &self.sleep_time
    }

    fn wake_time(&self) -> &str {
        &self.wake_time
    }
}
