//! LLM-backed summaries of sleep patterns.
//!
//! The HTTP layer never talks to a model provider directly. It converts the caller's records
//! into [`AnalysisEntry`] values (raw readings plus the duration from
//! [`crate::intervals::compute_duration`], so the prompt and the charts agree) and hands them
//! to whatever [`SleepAnalyzer`] the application was built with.
//!
//! [`GeminiAnalyzer`] is the production implementation. It refuses to construct without an API
//! key; the application then runs without analysis rather than failing to start.

pub mod gemini;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use crate::intervals::{IntervalError, SleepInterval, duration_between};

pub use gemini::GeminiAnalyzer;

/// Returned instead of calling the model when there is nothing to analyse.
pub const NO_RECORDS_MESSAGE: &str = "분석할 수면 기록이 없습니다.";

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("no API key configured for the analysis model (set GEMINI_API_KEY)")]
    MissingApiKey,

    #[error("request to analysis model failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("analysis model returned HTTP {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("analysis model returned an unexpected body: {0}")]
    InvalidResponse(String),

    #[error("analysis model returned no text")]
    EmptyResponse,

    #[error(transparent)]
    InvalidRecord(#[from] IntervalError),

    #[error("failed to serialize sleep records for the prompt: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One night as the model sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisEntry {
    pub date: NaiveDate,
    pub sleep_time: String,
    pub wake_time: String,
    /// Hours slept, one decimal
    pub duration: f64,
    pub notes: Option<String>,
}

impl AnalysisEntry {
    pub fn from_record<T: SleepInterval + ?Sized>(record: &T, notes: Option<&str>) -> Result<Self, IntervalError> {
        Ok(Self {
            date: record.night(),
            sleep_time: record.sleep_time().to_string(),
            wake_time: record.wake_time().to_string(),
            duration: duration_between(record.night(), record.sleep_time(), record.wake_time())?,
            notes: notes.map(str::to_string),
        })
    }
}

/// Something that can turn a set of nights into free-form advice.
#[async_trait]
pub trait SleepAnalyzer: Send + Sync {
    async fn summarize(&self, entries: &[AnalysisEntry]) -> Result<String, AnalysisError>;
}

/// The Korean-language prompt sent to the model: the nights as pretty-printed JSON, followed by
/// the four angles the answer should cover.
pub fn build_prompt(entries: &[AnalysisEntry]) -> Result<String, AnalysisError> {
    let data = serde_json::to_string_pretty(entries)?;

    Ok(format!(
        "
다음은 사용자의 수면 기록 데이터입니다. 이 데이터를 분석하여 수면 패턴에 대한 인사이트와 개선을 위한 조언을 제공해주세요.
데이터는 JSON 형식으로 제공되며, 각 기록은 날짜, 취침 시간, 기상 시간, 수면 시간(시간 단위), 그리고 특이사항을 포함합니다.

수면 데이터:
{data}

다음과 같은 관점에서 분석해주세요:
1. 전반적인 수면 패턴 (취침/기상 시간의 일관성)
2. 수면 시간의 충분성
3. 수면의 질에 영향을 줄 수 있는 요인
4. 개선을 위한 구체적인 제안

분석은 한국어로 작성해주세요."
    ))
}
