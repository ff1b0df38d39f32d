//! Session calendar and reporting periods.
//!
//! Months are 1-based (1 = January) everywhere in the service: session
//! calendars, record ids, report queries and labels all share one convention.
//! Weekdays count from Sunday (0) to Saturday (6).

use chrono::{Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Ordered dates in `month` of `year` that fall on `weekday`.
///
/// Out-of-range input yields an empty list.
pub fn session_dates(year: i32, month: u32, weekday: u32) -> Vec<NaiveDate> {
    if weekday > 6 {
        return Vec::new();
    }
    let Some(first) = NaiveDate::from_ymd_opt(year, month, 1) else {
        return Vec::new();
    };

    let offset = (7 + weekday - first.weekday().num_days_from_sunday()) % 7;
    let mut dates = Vec::with_capacity(5);
    let mut day = first + Duration::days(i64::from(offset));
    while day.month() == month {
        dates.push(day);
        match day.checked_add_signed(Duration::days(7)) {
            Some(next) => day = next,
            None => break,
        }
    }
    dates
}

/// A calendar month used as the identity of an attendance record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period {
    pub year: i32,
    pub month: u32,
}

impl Period {
    /// Build a period, rejecting months outside 1..=12.
    pub fn new(year: i32, month: u32) -> Result<Self, AppError> {
        if !(1..=12).contains(&month) {
            return Err(AppError::Validation(format!(
                "Month must be between 1 and 12, got {}",
                month
            )));
        }
        Ok(Self { year, month })
    }

    /// The period containing today's date (UTC).
    pub fn current() -> Self {
        let today = Utc::now().date_naive();
        Self {
            year: today.year(),
            month: today.month(),
        }
    }

    /// Deterministic record id, `"{year}-{month}"`.
    pub fn record_id(&self) -> String {
        format!("{}-{}", self.year, self.month)
    }

    /// Human label, `"{month}/{year}"`.
    pub fn label(&self) -> String {
        format!("{}/{}", self.month, self.year)
    }

    pub fn session_dates(&self, weekday: u32) -> Vec<NaiveDate> {
        session_dates(self.year, self.month, weekday)
    }
}
