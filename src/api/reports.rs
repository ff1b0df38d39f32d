//! Attendance report endpoints.

use axum::extract::{Query, State};
use serde::Deserialize;

use super::{success, ApiResult, CsvFile};
use crate::auth::{AuthContext, STAFF};
use crate::calendar::Period;
use crate::errors::AppError;
use crate::models::AttendanceSnapshot;
use crate::report::{query_by_period, series_rows, summarize, to_csv, ReportSummary};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportQuery {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub group_id: Option<String>,
}

impl ReportQuery {
    fn year(&self) -> i32 {
        self.year.unwrap_or_else(|| Period::current().year)
    }

    fn filename(&self) -> String {
        let mut name = format!("attendance-{}", self.year());
        if let Some(month) = self.month {
            name.push_str(&format!("-{}", month));
        }
        if let Some(group_id) = &self.group_id {
            let group_id = filename_part(group_id);
            if !group_id.is_empty() {
                name.push_str(&format!("-{}", group_id));
            }
        }
        name.push_str(".csv");
        name
    }
}

/// Keep only characters that are safe inside a quoted `Content-Disposition` filename.
fn filename_part(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

async fn load(state: &AppState, query: &ReportQuery) -> Result<Vec<AttendanceSnapshot>, AppError> {
    let mut snapshots = query_by_period(&state.store, query.year(), query.month).await?;
    if let Some(group_id) = &query.group_id {
        snapshots.retain(|s| &s.group_id == group_id);
    }
    Ok(snapshots)
}

/// GET /api/reports/attendance - Rates and chronological series.
pub async fn attendance_report(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<ReportQuery>,
) -> ApiResult<ReportSummary> {
    auth.require("read reports", STAFF)?;
    let snapshots = load(&state, &query).await?;
    success(summarize(query.year(), query.month, &snapshots))
}

/// GET /api/reports/attendance.csv - The rate series as CSV.
pub async fn attendance_report_csv(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<ReportQuery>,
) -> Result<CsvFile, AppError> {
    auth.require("export reports", STAFF)?;
    let snapshots = load(&state, &query).await?;
    let summary = summarize(query.year(), query.month, &snapshots);

    Ok(CsvFile {
        filename: query.filename(),
        body: to_csv(&series_rows(&summary.series)?),
    })
}
