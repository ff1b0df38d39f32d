//! REST API module.
//!
//! Handlers resolve the caller's [`AuthContext`](crate::auth::AuthContext),
//! validate input and delegate to the stores and the session registry.

mod calendar;
mod groups;
mod records;
mod reports;
mod sessions;

pub use calendar::*;
pub use groups::*;
pub use records::*;
pub use reports::*;
pub use sessions::*;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::calendar::Period;
use crate::errors::AppError;

/// Success response envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Response type that can be either success or error.
pub type ApiResult<T> = Result<ApiResponse<T>, AppError>;

/// Create a successful API response.
pub fn success<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(ApiResponse::new(data))
}

/// A CSV download.
#[derive(Debug)]
pub struct CsvFile {
    pub filename: String,
    pub body: String,
}

impl IntoResponse for CsvFile {
    fn into_response(self) -> Response {
        (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", self.filename),
                ),
            ],
            self.body,
        )
            .into_response()
    }
}

/// `?year&month` query shared by period-scoped endpoints.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PeriodQuery {
    pub year: Option<i32>,
    pub month: Option<u32>,
}

impl PeriodQuery {
    /// Resolve to a period, defaulting missing parts to the current month.
    pub fn resolve(&self) -> Result<Period, AppError> {
        let current = Period::current();
        Period::new(
            self.year.unwrap_or(current.year),
            self.month.unwrap_or(current.month),
        )
    }
}
