//! Health endpoint

use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde_json::json;

/// GET /healthz - liveness plus a few gauges.
pub async fn healthz(State(state): State<AppState>) -> Json<serde_json::Value> {
    let db_ok = state.db.ping().await.is_ok();
    Json(json!({
        "status": if db_ok { "ok" } else { "degraded" },
        "database": db_ok,
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "traces": {
            "enabled": state.traces.is_enabled(),
            "dropped": state.traces.dropped_count(),
        },
        "providers_cached": state.providers.len(),
    }))
}
