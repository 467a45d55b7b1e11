use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use validator::Validate;

use super::ApiError;
use crate::error::SnapshotError;
use crate::models::{Assignment, ExportMetadata, SnapshotResponse};
use crate::services::snapshot_engine::BulkExport;
use crate::services::AppState;

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ExportRequest {
    #[validate(range(min = 1))]
    pub exported_by: Option<i64>,
    #[validate(length(min = 1, max = 1024))]
    pub file_path: Option<String>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct BulkExportRequest {
    #[validate(range(min = 1))]
    pub exported_by: Option<i64>,
    #[validate(length(min = 1, max = 1024))]
    pub output_dir: Option<String>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

pub(crate) async fn load_assignment(
    state: &AppState,
    assignment_id: i64,
) -> Result<Assignment, ApiError> {
    let assignment = state
        .assignments
        .get(assignment_id)
        .await?
        .ok_or(SnapshotError::AssignmentNotFound(assignment_id))?;
    Ok(assignment)
}

/// GET /api/v1/assignments/{id}/snapshots
pub async fn list_snapshots(
    State(state): State<Arc<AppState>>,
    Path(assignment_id): Path<i64>,
) -> Result<Json<Vec<SnapshotResponse>>, ApiError> {
    load_assignment(&state, assignment_id).await?;
    let rows = state.engine.list(assignment_id).await?;
    Ok(Json(rows.into_iter().map(SnapshotResponse::from).collect()))
}

/// GET /api/v1/assignments/{id}/snapshots/{variant}
pub async fn get_snapshot(
    State(state): State<Arc<AppState>>,
    Path((assignment_id, variant_number)): Path<(i64, u32)>,
) -> Result<Json<SnapshotResponse>, ApiError> {
    let assignment = load_assignment(&state, assignment_id).await?;
    let record = state
        .engine
        .get_or_create(&assignment, variant_number)
        .await?;
    Ok(Json(record.into()))
}

/// POST /api/v1/assignments/{id}/snapshots/{variant}/export
pub async fn export_snapshot(
    State(state): State<Arc<AppState>>,
    Path((assignment_id, variant_number)): Path<(i64, u32)>,
    Json(payload): Json<ExportRequest>,
) -> Result<Json<SnapshotResponse>, ApiError> {
    payload.validate()?;
    let assignment = load_assignment(&state, assignment_id).await?;

    let metadata = ExportMetadata::by(payload.exported_by)
        .with_file_path(payload.file_path)
        .with_notes(payload.notes);
    let record = state
        .engine
        .record_export(&assignment, variant_number, metadata)
        .await?;
    Ok(Json(record.into()))
}

/// POST /api/v1/assignments/{id}/exports
pub async fn export_all_variants(
    State(state): State<Arc<AppState>>,
    Path(assignment_id): Path<i64>,
    Json(payload): Json<BulkExportRequest>,
) -> Result<Json<Vec<SnapshotResponse>>, ApiError> {
    payload.validate()?;
    let assignment = load_assignment(&state, assignment_id).await?;

    let request = BulkExport {
        exported_by: payload.exported_by,
        output_dir: payload.output_dir.or_else(|| state.config.export_dir.clone()),
        notes: payload.notes,
    };
    let rows = state.engine.export_variants(&assignment, &request).await?;
    Ok(Json(rows.into_iter().map(SnapshotResponse::from).collect()))
}

/// POST /api/v1/assignments/{id}/snapshots/regenerate
pub async fn regenerate_snapshots(
    State(state): State<Arc<AppState>>,
    Path(assignment_id): Path<i64>,
) -> Result<Json<Vec<SnapshotResponse>>, ApiError> {
    let assignment = load_assignment(&state, assignment_id).await?;
    let rows = state.engine.regenerate(&assignment).await?;
    Ok(Json(rows.into_iter().map(SnapshotResponse::from).collect()))
}

/// DELETE /api/v1/assignments/{id}/snapshots
pub async fn invalidate_snapshots(
    State(state): State<Arc<AppState>>,
    Path(assignment_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let deleted = state.engine.invalidate(assignment_id).await?;
    Ok(Json(json!({ "deleted": deleted })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_request_rejects_blank_file_path() {
        let payload: ExportRequest = serde_json::from_value(json!({ "file_path": "" })).unwrap();
        assert!(payload.validate().is_err());

        let payload: ExportRequest = serde_json::from_value(json!({})).unwrap();
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn bulk_export_request_rejects_unknown_fields() {
        let result = serde_json::from_value::<BulkExportRequest>(json!({ "outputdir": "/tmp" }));
        assert!(result.is_err());
    }
}
