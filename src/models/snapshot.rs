//! Attendance snapshot model.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::Member;
use crate::calendar::Period;

/// Value copy of a member at submission time.
///
/// Once written it no longer follows edits to the live roster.
pub type MemberSnapshot = Member;

/// One class's attendance for one month.
///
/// Stored at `classes/{groupId}/attendanceRecords/{recordId}`; `groupId` is
/// taken from the parent document on read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSnapshot {
    pub record_id: String,
    #[serde(default)]
    pub group_id: String,
    pub year: i32,
    pub month: u32,
    #[serde(default)]
    pub group_name: String,
    #[serde(default)]
    pub teacher_name: String,
    #[serde(default)]
    pub elder_name: String,
    #[serde(default)]
    pub session_dates: Vec<NaiveDate>,
    #[serde(default)]
    pub members: Vec<MemberSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub written_at: Option<String>,
}

impl AttendanceSnapshot {
    pub fn period(&self) -> Period {
        Period {
            year: self.year,
            month: self.month,
        }
    }
}

/// Request body for submitting a snapshot. Absent fields are left untouched
/// on an existing record for the same period.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SubmitSnapshotRequest {
    pub year: i32,
    pub month: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elder_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_dates: Option<Vec<NaiveDate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub members: Option<Vec<MemberSnapshot>>,
}

/// Request body for patching a stored snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSnapshotRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elder_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_dates: Option<Vec<NaiveDate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub members: Option<Vec<MemberSnapshot>>,
}

impl UpdateSnapshotRequest {
    pub fn is_empty(&self) -> bool {
        self.group_name.is_none()
            && self.teacher_name.is_none()
            && self.elder_name.is_none()
            && self.session_dates.is_none()
            && self.members.is_none()
    }
}
