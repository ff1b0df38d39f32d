//! Attendance record endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use super::{success, ApiResult, CsvFile};
use crate::auth::{AuthContext, ADMIN_ONLY, STAFF};
use crate::errors::AppError;
use crate::models::{AttendanceSnapshot, SubmitSnapshotRequest, UpdateSnapshotRequest};
use crate::report::{query_by_period, snapshot_rows, to_csv};
use crate::AppState;

/// GET /api/groups/:id/records - All snapshots of a class.
pub async fn list_records(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> ApiResult<Vec<AttendanceSnapshot>> {
    auth.require("read attendance", STAFF)?;
    success(state.records.fetch_all(&id).await?)
}

/// POST /api/groups/:id/records - Submit (merge) the snapshot of a period.
pub async fn submit_record(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<String>,
    Json(request): Json<SubmitSnapshotRequest>,
) -> ApiResult<AttendanceSnapshot> {
    auth.require("submit attendance", STAFF)?;
    success(state.records.submit(&id, &request).await?)
}

/// GET /api/groups/:id/records/:record_id - One snapshot.
pub async fn get_record(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((id, record_id)): Path<(String, String)>,
) -> ApiResult<AttendanceSnapshot> {
    auth.require("read attendance", STAFF)?;
    match state.records.get(&id, &record_id).await? {
        Some(snapshot) => success(snapshot),
        None => Err(AppError::NotFound(format!(
            "Attendance record {} not found for class {}",
            record_id, id
        ))),
    }
}

/// PUT /api/groups/:id/records/:record_id - Patch an existing snapshot.
pub async fn update_record(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((id, record_id)): Path<(String, String)>,
    Json(request): Json<UpdateSnapshotRequest>,
) -> ApiResult<AttendanceSnapshot> {
    auth.require("update attendance", STAFF)?;
    if request.is_empty() {
        return Err(AppError::Validation("No fields to update".to_string()));
    }
    success(state.records.update(&id, &record_id, &request).await?)
}

/// DELETE /api/groups/:id/records/:record_id - Delete a snapshot.
pub async fn delete_record(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((id, record_id)): Path<(String, String)>,
) -> ApiResult<()> {
    auth.require("delete attendance", ADMIN_ONLY)?;
    state.records.delete(&id, &record_id).await?;
    success(())
}

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

/// GET /api/records/recent - Snapshots written in `[from, to)`.
pub async fn recent_records(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<RecentQuery>,
) -> ApiResult<Vec<AttendanceSnapshot>> {
    auth.require("read attendance", STAFF)?;
    let mut snapshots = state.records.written_between(query.from, query.to).await?;
    snapshots.sort_by(|a, b| b.written_at.cmp(&a.written_at));
    success(snapshots)
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub year: Option<i32>,
    pub month: Option<u32>,
}

/// GET /api/records/export.csv - Raw dump of stored snapshots.
pub async fn export_records(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<ExportQuery>,
) -> Result<CsvFile, AppError> {
    auth.require("export attendance", ADMIN_ONLY)?;

    let (snapshots, filename) = match (query.year, query.month) {
        (Some(year), month) => {
            let snapshots = query_by_period(&state.store, year, month).await?;
            let filename = match month {
                Some(month) => format!("attendance-records-{}-{}.csv", year, month),
                None => format!("attendance-records-{}.csv", year),
            };
            (snapshots, filename)
        }
        (None, Some(_)) => {
            return Err(AppError::Validation(
                "A month filter requires a year".to_string(),
            ))
        }
        (None, None) => (
            state.records.written_between(None, None).await?,
            "attendance-records.csv".to_string(),
        ),
    };

    tracing::info!("Exporting {} attendance records", snapshots.len());
    Ok(CsvFile {
        filename,
        body: to_csv(&snapshot_rows(&snapshots)?),
    })
}
