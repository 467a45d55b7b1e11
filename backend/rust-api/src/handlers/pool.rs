use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use super::snapshots::load_assignment;
use super::ApiError;
use crate::models::PoolStats;
use crate::services::pool_report::PoolReport;
use crate::services::AppState;

/// GET /api/v1/assignments/{id}/pool-report
pub async fn get_pool_report(
    State(state): State<Arc<AppState>>,
    Path(assignment_id): Path<i64>,
) -> Result<Json<PoolReport>, ApiError> {
    let assignment = load_assignment(&state, assignment_id).await?;
    let report = state.reports.report(&assignment).await?;
    Ok(Json(report))
}

/// GET /api/v1/topics/{id}/pool-stats
pub async fn get_pool_stats(
    State(state): State<Arc<AppState>>,
    Path(topic_id): Path<i64>,
) -> Result<Json<PoolStats>, ApiError> {
    let stats = state.reports.pool_stats(topic_id).await?;
    Ok(Json(stats))
}
