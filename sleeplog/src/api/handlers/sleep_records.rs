//! HTTP handlers for sleep records, chart series and analysis.
//!
//! Every handler opens its repository with the caller's id, so records belonging to someone
//! else behave exactly like records that do not exist.

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
};
use tracing::{info, instrument};

use crate::{
    AppState,
    analysis::AnalysisEntry,
    api::extractors::{ApiJson, ApiPath, ApiQuery},
    api::models::{
        sleep_records::{
            AnalysisQuery, AnalysisResponse, ChartQuery, ChartResponse, ListSleepRecordsQuery, SleepRecordCreate,
            SleepRecordResponse, SleepRecordUpdate,
        },
        users::CurrentUser,
    },
    db::{
        errors::DbError,
        handlers::{Repository, SleepRecords},
        models::sleep_records::{SleepRecordCreateDBRequest, SleepRecordFilter, SleepRecordUpdateDBRequest},
    },
    errors::{Error, Result},
    intervals::{ChartAxes, IntervalError, build_chart_series, recent_window},
    types::SleepRecordId,
};

/// A stored reading that no longer parses is a server-side fault, not a bad request.
fn stored_record_error(err: IntervalError) -> Error {
    Error::Other(anyhow::Error::new(err).context("Stored sleep record is malformed"))
}

/// List the caller's records, oldest night first.
#[utoipa::path(
    get,
    path = "/sleep-records",
    tag = "sleep-records",
    summary = "List sleep records",
    params(ListSleepRecordsQuery),
    responses(
        (status = 200, description = "Records ordered by date", body = [SleepRecordResponse]),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error"),
    ),
    security(("X-Sleeplog-User-Email" = []))
)]
#[instrument(skip_all, fields(user_id = current_user.id))]
pub async fn list_sleep_records(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListSleepRecordsQuery>,
    current_user: CurrentUser,
) -> Result<Json<Vec<SleepRecordResponse>>> {
    if let (Some(from), Some(to)) = (query.from, query.to)
        && from > to
    {
        return Err(Error::BadRequest {
            message: format!("'from' ({from}) must not be after 'to' ({to})"),
        });
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = SleepRecords::new(&mut conn, current_user.id);

    let records = repo.list(&query.into()).await?;
    Ok(Json(records.into_iter().map(Into::into).collect()))
}

/// Log a night.
#[utoipa::path(
    post,
    path = "/sleep-records",
    tag = "sleep-records",
    summary = "Create sleep record",
    request_body = SleepRecordCreate,
    responses(
        (status = 201, description = "Record created", body = SleepRecordResponse),
        (status = 400, description = "Invalid date or time"),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error"),
    ),
    security(("X-Sleeplog-User-Email" = []))
)]
#[instrument(skip_all, fields(user_id = current_user.id))]
pub async fn create_sleep_record(
    State(state): State<AppState>,
    current_user: CurrentUser,
    ApiJson(request): ApiJson<SleepRecordCreate>,
) -> Result<(StatusCode, Json<SleepRecordResponse>)> {
    let db_request = SleepRecordCreateDBRequest::try_from(request)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = SleepRecords::new(&mut conn, current_user.id);

    let record = repo.create(&db_request).await?;
    info!(record_id = record.id, "Sleep record created");

    Ok((StatusCode::CREATED, Json(record.into())))
}

/// Change some fields of a record. Omitted fields keep their value.
#[utoipa::path(
    put,
    path = "/sleep-records/{id}",
    tag = "sleep-records",
    summary = "Update sleep record",
    params(("id" = i64, Path, description = "Record ID")),
    request_body = SleepRecordUpdate,
    responses(
        (status = 200, description = "Updated record", body = SleepRecordResponse),
        (status = 400, description = "Invalid date or time"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Record not found"),
        (status = 500, description = "Internal server error"),
    ),
    security(("X-Sleeplog-User-Email" = []))
)]
#[instrument(skip_all, fields(user_id = current_user.id, record_id = id))]
pub async fn update_sleep_record(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<SleepRecordId>,
    current_user: CurrentUser,
    ApiJson(request): ApiJson<SleepRecordUpdate>,
) -> Result<Json<SleepRecordResponse>> {
    let db_request = SleepRecordUpdateDBRequest::try_from(request)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = SleepRecords::new(&mut conn, current_user.id);

    match repo.update(id, &db_request).await {
        Ok(record) => Ok(Json(record.into())),
        Err(DbError::NotFound) => Err(Error::record_not_found(id)),
        Err(e) => Err(e.into()),
    }
}

#[utoipa::path(
    delete,
    path = "/sleep-records/{id}",
    tag = "sleep-records",
    summary = "Delete sleep record",
    params(("id" = i64, Path, description = "Record ID")),
    responses(
        (status = 204, description = "Record deleted"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Record not found"),
        (status = 500, description = "Internal server error"),
    ),
    security(("X-Sleeplog-User-Email" = []))
)]
#[instrument(skip_all, fields(user_id = current_user.id, record_id = id))]
pub async fn delete_sleep_record(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<SleepRecordId>,
    current_user: CurrentUser,
) -> Result<StatusCode> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = SleepRecords::new(&mut conn, current_user.id);

    if repo.delete(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::record_not_found(id))
    }
}

/// Chart series over the most recent nights.
#[utoipa::path(
    get,
    path = "/sleep-records/chart",
    tag = "sleep-records",
    summary = "Sleep chart series",
    description = "One point per night for the most recent `window` nights, oldest first. Bedtimes \
                   before 06:00 are plotted past 24 so that late nights stay above earlier ones.",
    params(ChartQuery),
    responses(
        (status = 200, description = "Chart series", body = ChartResponse),
        (status = 400, description = "Unsupported window"),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error"),
    ),
    security(("X-Sleeplog-User-Email" = []))
)]
#[instrument(skip_all, fields(user_id = current_user.id))]
pub async fn get_sleep_chart(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ChartQuery>,
    current_user: CurrentUser,
) -> Result<Json<ChartResponse>> {
    let window = query.window.unwrap_or_default();

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = SleepRecords::new(&mut conn, current_user.id);

    let records = repo.list(&SleepRecordFilter::default()).await?;
    let points = build_chart_series(&records, window).map_err(stored_record_error)?;

    Ok(Json(ChartResponse {
        window,
        points,
        axes: ChartAxes::default(),
    }))
}

/// Ask the analysis model about the caller's sleep.
#[utoipa::path(
    get,
    path = "/sleep-records/analysis",
    tag = "sleep-records",
    summary = "Analyse sleep pattern",
    description = "Sends the caller's records (optionally only the most recent `window` nights) to the \
                   configured language model and returns its advice in Korean. Not retried on failure.",
    params(AnalysisQuery),
    responses(
        (status = 200, description = "Analysis text", body = AnalysisResponse),
        (status = 401, description = "Unauthorized"),
        (status = 502, description = "The analysis model failed"),
        (status = 503, description = "Analysis is not configured"),
    ),
    security(("X-Sleeplog-User-Email" = []))
)]
#[instrument(skip_all, fields(user_id = current_user.id))]
pub async fn analyze_sleep_records(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<AnalysisQuery>,
    current_user: CurrentUser,
) -> Result<Json<AnalysisResponse>> {
    let analyzer = state.analyzer.clone().ok_or_else(|| Error::ServiceUnavailable {
        message: "Sleep analysis is not configured on this server".to_string(),
    })?;

    let records = {
        let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        SleepRecords::new(&mut conn, current_user.id)
            .list(&SleepRecordFilter::default())
            .await?
    };

    let selected = match query.window {
        Some(window) => recent_window(&records, window),
        None => records.iter().collect(),
    };

    let entries = selected
        .into_iter()
        .map(|record| AnalysisEntry::from_record(record, record.notes.as_deref()))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(stored_record_error)?;

    let analysis = analyzer.summarize(&entries).await?;

    Ok(Json(AnalysisResponse {
        analysis: analysis.trim().to_string(),
        record_count: entries.len(),
    }))
}
