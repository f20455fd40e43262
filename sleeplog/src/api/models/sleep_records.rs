//! API request/response models for sleep records, chart series and analysis.

use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use utoipa::{IntoParams, ToSchema};

use crate::db::models::sleep_records::{
    SleepRecordCreateDBRequest, SleepRecordDBResponse, SleepRecordFilter, SleepRecordUpdateDBRequest,
};
use crate::errors::Error;
use crate::intervals::{ChartAxes, ChartWindow, DerivedChartPoint, validate_clock_time};
use crate::types::{SleepRecordId, UserId};

static RECORD_DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("date pattern compiles"));

/// Parse a `YYYY-MM-DD` night, rejecting other shapes and impossible dates like 2024-02-30.
pub fn parse_record_date(input: &str) -> Result<NaiveDate, Error> {
    let invalid = || Error::BadRequest {
        message: format!("Invalid date '{input}', expected YYYY-MM-DD"),
    };
    if !RECORD_DATE_RE.is_match(input) {
        return Err(invalid());
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d").map_err(|_| invalid())
}

/// Request body for logging a night.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SleepRecordCreate {
    /// Night the interval begins, `YYYY-MM-DD`
    #[schema(example = "2024-03-01")]
    pub date: String,
    /// `HH:MM`, 24-hour
    #[schema(example = "23:00")]
    pub sleep_time: String,
    /// `HH:MM`, 24-hour; earlier than `sleepTime` means the next morning
    #[schema(example = "07:00")]
    pub wake_time: String,
    pub notes: Option<String>,
}

impl TryFrom<SleepRecordCreate> for SleepRecordCreateDBRequest {
    type Error = Error;

    fn try_from(api: SleepRecordCreate) -> Result<Self, Self::Error> {
        let date = parse_record_date(&api.date)?;
        validate_clock_time(&api.sleep_time)?;
        validate_clock_time(&api.wake_time)?;

        Ok(Self {
            date,
            sleep_time: api.sleep_time,
            wake_time: api.wake_time,
            notes: api.notes,
        })
    }
}

/// Request body for a partial update. Omitted fields keep their stored value; `notes: null`
/// clears the notes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SleepRecordUpdate {
    pub date: Option<String>,
    pub sleep_time: Option<String>,
    pub wake_time: Option<String>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[schema(value_type = Option<String>)]
    pub notes: Option<Option<String>>,
}

impl TryFrom<SleepRecordUpdate> for SleepRecordUpdateDBRequest {
    type Error = Error;

    fn try_from(api: SleepRecordUpdate) -> Result<Self, Self::Error> {
        let date = api.date.as_deref().map(parse_record_date).transpose()?;
        if let Some(sleep_time) = &api.sleep_time {
            validate_clock_time(sleep_time)?;
        }
        if let Some(wake_time) = &api.wake_time {
            validate_clock_time(wake_time)?;
        }

        Ok(Self {
            date,
            sleep_time: api.sleep_time,
            wake_time: api.wake_time,
            notes: api.notes,
        })
    }
}

/// A stored night, as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SleepRecordResponse {
    pub id: SleepRecordId,
    pub user_id: UserId,
    pub date: NaiveDate,
    pub sleep_time: String,
    pub wake_time: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<SleepRecordDBResponse> for SleepRecordResponse {
    fn from(db: SleepRecordDBResponse) -> Self {
        Self {
            id: db.id,
            user_id: db.user_id,
            date: db.date,
            sleep_time: db.sleep_time,
            wake_time: db.wake_time,
            notes: db.notes,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

/// Query parameters for listing records
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct ListSleepRecordsQuery {
    /// Earliest night to include (inclusive)
    pub from: Option<NaiveDate>,
    /// Latest night to include (inclusive)
    pub to: Option<NaiveDate>,
}

impl From<ListSleepRecordsQuery> for SleepRecordFilter {
    fn from(query: ListSleepRecordsQuery) -> Self {
        Self {
            from: query.from,
            to: query.to,
        }
    }
}

/// Query parameters for chart series
#[serde_as]
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ChartQuery {
    /// Number of most recent nights: 7, 14, 30 or 90 (default 7)
    #[param(value_type = Option<u32>, example = 7)]
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub window: Option<ChartWindow>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChartResponse {
    /// Window that was applied, in nights
    #[schema(value_type = u32)]
    pub window: ChartWindow,
    /// Oldest night first
    pub points: Vec<DerivedChartPoint>,
    /// Ranges and tick labels for plotting `points`
    pub axes: ChartAxes,
}

/// Query parameters for an analysis request
#[serde_as]
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct AnalysisQuery {
    /// Only analyse the most recent nights (7, 14, 30 or 90). Omit to analyse everything.
    #[param(value_type = Option<u32>)]
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub window: Option<ChartWindow>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    /// Free-form text from the analysis model, lightly formatted
    pub analysis: String,
    /// How many nights were sent for analysis
    pub record_count: usize,
}
