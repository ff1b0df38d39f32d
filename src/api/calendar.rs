//! Session calendar endpoint.

use axum::extract::{Query, State};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{success, ApiResult, PeriodQuery};
use crate::errors::AppError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CalendarQuery {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub weekday: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarResponse {
    pub year: i32,
    pub month: u32,
    pub weekday: u32,
    pub record_id: String,
    pub period_label: String,
    pub session_dates: Vec<NaiveDate>,
}

/// GET /api/calendar - Session dates of a month.
pub async fn get_calendar(
    State(state): State<AppState>,
    Query(query): Query<CalendarQuery>,
) -> ApiResult<CalendarResponse> {
    let period = PeriodQuery {
        year: query.year,
        month: query.month,
    }
    .resolve()?;
    let weekday = query.weekday.unwrap_or(state.config.session_weekday);
    if weekday > 6 {
        return Err(AppError::Validation(format!(
            "Weekday must be between 0 (Sunday) and 6 (Saturday), got {}",
            weekday
        )));
    }

    success(CalendarResponse {
        year: period.year,
        month: period.month,
        weekday,
        record_id: period.record_id(),
        period_label: period.label(),
        session_dates: period.session_dates(weekday),
    })
}
