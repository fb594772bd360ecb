//! Trace read routes: cursor pagination and windowed aggregates

use crate::db::{TraceSummary, TraceWindowAggregate};
use crate::error::{ApiError, ApiResult};
use crate::middleware::PortalExtractor;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::Json;
use chrono::{Duration, Utc};
use loom_core::TraceId;
use serde::{Deserialize, Serialize};

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;
const DEFAULT_WINDOW_DAYS: i64 = 7;
const MAX_WINDOW_DAYS: i64 = 90;

#[derive(Debug, Deserialize, Default)]
pub struct ListTracesQuery {
    pub cursor: Option<TraceId>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ListTracesResponse {
    pub traces: Vec<TraceSummary>,
    /// Pass back as `cursor` to fetch the next page; absent on the last.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<TraceId>,
}

/// GET /v1/portal/traces
pub async fn list_traces(
    State(state): State<AppState>,
    PortalExtractor(context): PortalExtractor,
    Query(query): Query<ListTracesQuery>,
) -> ApiResult<Json<ListTracesResponse>> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    if !(1..=MAX_PAGE_SIZE).contains(&limit) {
        return Err(ApiError::invalid_request(format!(
            "limit must be between 1 and {MAX_PAGE_SIZE}"
        )));
    }

    let traces = state
        .db
        .trace_list(context.tenant_id, query.cursor, limit)
        .await?;
    let next_cursor = if traces.len() as i64 == limit {
        traces.last().map(|t| t.trace_id)
    } else {
        None
    };

    Ok(Json(ListTracesResponse {
        traces,
        next_cursor,
    }))
}

#[derive(Debug, Deserialize, Default)]
pub struct AggregatesQuery {
    pub days: Option<i64>,
}

/// GET /v1/portal/traces/aggregates - per-day request counts, token sums
/// and latency averages over a trailing window.
pub async fn trace_aggregates(
    State(state): State<AppState>,
    PortalExtractor(context): PortalExtractor,
    Query(query): Query<AggregatesQuery>,
) -> ApiResult<Json<Vec<TraceWindowAggregate>>> {
    let days = query.days.unwrap_or(DEFAULT_WINDOW_DAYS);
    if !(1..=MAX_WINDOW_DAYS).contains(&days) {
        return Err(ApiError::invalid_request(format!(
            "days must be between 1 and {MAX_WINDOW_DAYS}"
        )));
    }

    let since = Utc::now() - Duration::days(days);
    let aggregates = state.db.trace_aggregates(context.tenant_id, since).await?;
    Ok(Json(aggregates))
}
