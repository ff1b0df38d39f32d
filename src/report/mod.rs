//! Cross-class attendance reporting.
//!
//! Snapshots are read back across every class with one collection-group
//! query, turned into per-period rates and ordered chronologically.

mod csv;

pub use csv::*;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::db::{snapshot_from_document, DocumentStore, Filter, Scope, ATTENDANCE_RECORDS};
use crate::errors::AppError;
use crate::models::AttendanceSnapshot;

/// Attendance counts of one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateBreakdown {
    pub total_lessons: usize,
    pub total_members: usize,
    pub attended: usize,
    pub possible: usize,
    /// Percentage in `0..=100`; `0` when nothing was possible.
    pub rate: f64,
}

/// One point of a chronological rate series.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesPoint {
    pub period_label: String,
    pub group_id: String,
    pub group_name: String,
    pub teacher_name: String,
    pub elder_name: String,
    pub year: i32,
    pub month: u32,
    pub attended: usize,
    pub possible: usize,
    pub rate: f64,
}

/// Rates for a set of classes over the selected period.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub year: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub month: Option<u32>,
    pub record_count: usize,
    pub attended: usize,
    pub possible: usize,
    pub rate: f64,
    pub series: Vec<SeriesPoint>,
}

/// All snapshots across classes for `year`, optionally narrowed to `month`.
pub async fn query_by_period(
    store: &DocumentStore,
    year: i32,
    month: Option<u32>,
) -> Result<Vec<AttendanceSnapshot>, AppError> {
    let mut filters = vec![Filter::eq("year", year)];
    if let Some(month) = month {
        if !(1..=12).contains(&month) {
            return Err(AppError::Validation(format!(
                "Month must be between 1 and 12, got {}",
                month
            )));
        }
        filters.push(Filter::eq("month", month));
    }

    let docs = store
        .list(&Scope::Group(ATTENDANCE_RECORDS.to_string()), &filters)
        .await?;
    tracing::debug!(
        "Report query year={} month={:?} matched {} records",
        year,
        month,
        docs.len()
    );
    docs.iter().map(snapshot_from_document).collect()
}

/// Attendance rate of one snapshot.
///
/// Only the first `sessionDates.len()` marks of each member count. Marks
/// left over from a longer calendar are capped away, so `attended` never
/// exceeds `possible` and the rate stays within `0..=100`.
pub fn compute_rate(snapshot: &AttendanceSnapshot) -> RateBreakdown {
    let total_lessons = snapshot.session_dates.len();
    let total_members = snapshot.members.len();
    let attended = snapshot
        .members
        .iter()
        .map(|m| {
            m.attendance
                .iter()
                .take(total_lessons)
                .filter(|present| **present)
                .count()
        })
        .sum();
    let possible = total_lessons * total_members;

    RateBreakdown {
        total_lessons,
        total_members,
        attended,
        possible,
        rate: percentage(attended, possible),
    }
}

/// `attended / possible` as a percentage, `0` when nothing was possible.
pub fn percentage(attended: usize, possible: usize) -> f64 {
    if possible == 0 {
        return 0.0;
    }
    attended as f64 / possible as f64 * 100.0
}

/// Round a rate to two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Rate series ordered by `(year, month)`. Records of the same period keep
/// their input order.
pub fn to_series(snapshots: &[AttendanceSnapshot]) -> Vec<SeriesPoint> {
    let mut series: Vec<SeriesPoint> = snapshots
        .iter()
        .map(|snapshot| {
            let breakdown = compute_rate(snapshot);
            SeriesPoint {
                period_label: snapshot.period().label(),
                group_id: snapshot.group_id.clone(),
                group_name: snapshot.group_name.clone(),
                teacher_name: snapshot.teacher_name.clone(),
                elder_name: snapshot.elder_name.clone(),
                year: snapshot.year,
                month: snapshot.month,
                attended: breakdown.attended,
                possible: breakdown.possible,
                rate: round2(breakdown.rate),
            }
        })
        .collect();
    series.sort_by_key(|point| (point.year, point.month));
    series
}

/// Overall and per-record rates for the selected snapshots.
pub fn summarize(year: i32, month: Option<u32>, snapshots: &[AttendanceSnapshot]) -> ReportSummary {
    let series = to_series(snapshots);
    let attended = series.iter().map(|p| p.attended).sum();
    let possible = series.iter().map(|p| p.possible).sum();

    ReportSummary {
        year,
        month,
        record_count: series.len(),
        attended,
        possible,
        rate: round2(percentage(attended, possible)),
        series,
    }
}

/// CSV rows for a series, rate fixed to two decimals.
pub fn series_rows(series: &[SeriesPoint]) -> Result<Vec<Map<String, Value>>, AppError> {
    let mut rows = to_rows(series)?;
    for (row, point) in rows.iter_mut().zip(series) {
        row.insert("rate".into(), Value::String(format!("{:.2}", point.rate)));
    }
    Ok(rows)
}

/// Raw CSV rows of stored snapshots, one per record, in input order.
pub fn snapshot_rows(snapshots: &[AttendanceSnapshot]) -> Result<Vec<Map<String, Value>>, AppError> {
    let mut rows = to_rows(snapshots)?;
    for (row, snapshot) in rows.iter_mut().zip(snapshots) {
        let dates = snapshot
            .session_dates
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        row.insert("sessionDates".into(), Value::String(dates));
        row.entry("writtenAt").or_insert(Value::Null);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::session_dates;
    use crate::db::testing::temp_store;
    use crate::db::RecordStore;
    use crate::models::{Member, SubmitSnapshotRequest};

    fn member(name: &str, marks: &[bool]) -> Member {
        Member {
            id: name.to_lowercase(),
            full_name: name.to_string(),
            attendance: marks.to_vec(),
            ..Default::default()
        }
    }

    fn snapshot(group: &str, year: i32, month: u32, members: Vec<Member>, sessions: usize) -> AttendanceSnapshot {
        AttendanceSnapshot {
            record_id: format!("{}-{}", year, month),
            group_id: group.to_lowercase(),
            year,
            month,
            group_name: group.to_string(),
            teacher_name: String::new(),
            elder_name: String::new(),
            session_dates: session_dates(year, month, 6).into_iter().take(sessions).collect(),
            members,
            written_at: None,
        }
    }

    #[test]
    fn test_rate_for_two_members() {
        let snap = snapshot(
            "G1",
            2025,
            3,
            vec![
                member("Alice", &[true, true, false, false, false]),
                member("Bob", &[false; 5]),
            ],
            5,
        );
        let rate = compute_rate(&snap);
        assert_eq!(rate.total_lessons, 5);
        assert_eq!(rate.attended, 2);
        assert_eq!(rate.possible, 10);
        assert!((rate.rate - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_rate_zero_when_nothing_possible() {
        let no_members = snapshot("G2", 2025, 3, vec![], 5);
        assert_eq!(compute_rate(&no_members).rate, 0.0);

        let no_sessions = snapshot("G3", 2025, 3, vec![member("A", &[true])], 0);
        let rate = compute_rate(&no_sessions);
        assert_eq!(rate.possible, 0);
        assert_eq!(rate.rate, 0.0);
        assert!(!rate.rate.is_nan());
    }

    #[test]
    fn test_marks_beyond_calendar_ignored() {
        let snap = snapshot("G1", 2025, 4, vec![member("A", &[true; 6])], 4);
        let rate = compute_rate(&snap);
        assert_eq!(rate.attended, 4);
        assert!((rate.rate - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_series_sorted_by_year_then_month_only() {
        let snapshots = vec![
            snapshot("Zeta", 2025, 10, vec![], 4),
            snapshot("Alpha", 2025, 2, vec![], 4),
            snapshot("Beta", 2024, 11, vec![], 4),
            snapshot("Aardvark", 2025, 2, vec![], 4),
        ];
        let series = to_series(&snapshots);
        let labels: Vec<(&str, &str)> = series
            .iter()
            .map(|p| (p.period_label.as_str(), p.group_name.as_str()))
            .collect();
        assert_eq!(
            labels,
            vec![
                ("11/2024", "Beta"),
                ("2/2025", "Alpha"),
                ("2/2025", "Aardvark"),
                ("10/2025", "Zeta"),
            ]
        );
    }

    #[test]
    fn test_summary_aggregates_across_groups() {
        let snapshots = vec![
            snapshot(
                "G1",
                2025,
                3,
                vec![
                    member("Alice", &[true, true, false, false, false]),
                    member("Bob", &[]),
                ],
                5,
            ),
            snapshot("G2", 2025, 3, vec![], 5),
        ];
        let summary = summarize(2025, Some(3), &snapshots);
        assert_eq!(summary.record_count, 2);
        assert_eq!(summary.attended, 2);
        assert_eq!(summary.possible, 10);
        assert_eq!(summary.rate, 20.0);
        assert_eq!(summary.series[1].rate, 0.0);
    }

    #[test]
    fn test_series_rows_format_rate() {
        let series = to_series(&[snapshot(
            "G1",
            2025,
            3,
            vec![member("A", &[true, false, false])],
            3,
        )]);
        let csv = to_csv(&series_rows(&series).unwrap());
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "\"periodLabel\",\"groupId\",\"groupName\",\"teacherName\",\"elderName\",\"year\",\"month\",\"attended\",\"possible\",\"rate\""
        );
        assert_eq!(
            lines.next().unwrap(),
            "\"3/2025\",\"g1\",\"G1\",\"\",\"\",\"2025\",\"3\",\"1\",\"3\",\"33.33\""
        );
    }

    #[test]
    fn test_snapshot_rows_flatten_members() {
        let snap = snapshot("G1", 2025, 3, vec![member("A", &[]), member("B", &[])], 2);
        let csv = to_csv(&snapshot_rows(&[snap]).unwrap());
        let header = csv.lines().next().unwrap();
        assert!(header.starts_with("\"recordId\",\"groupId\""));
        let data = csv.lines().nth(1).unwrap();
        assert!(data.contains("\"A; B\""));
        assert!(data.contains("\"2025-03-01; 2025-03-08\""));
    }

    #[tokio::test]
    async fn test_query_by_period_spans_classes() {
        let (store, _dir) = temp_store().await;
        let records = RecordStore::new(store.clone());

        for (group, month) in [("g1", 3), ("g2", 3), ("g2", 4)] {
            records
                .submit(
                    group,
                    &SubmitSnapshotRequest {
                        year: 2025,
                        month,
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
        }
        records
            .submit(
                "g3",
                &SubmitSnapshotRequest {
                    year: 2024,
                    month: 3,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(query_by_period(&store, 2025, None).await.unwrap().len(), 3);

        let march = query_by_period(&store, 2025, Some(3)).await.unwrap();
        let mut groups: Vec<String> = march.into_iter().map(|s| s.group_id).collect();
        groups.sort();
        assert_eq!(groups, vec!["g1", "g2"]);

        assert!(matches!(
            query_by_period(&store, 2025, Some(13)).await,
            Err(AppError::Validation(_))
        ));
    }
}
