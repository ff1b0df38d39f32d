//! In-memory attendance matrix.
//!
//! Holds the editable grid of members × session dates for one class and
//! month before it is submitted. Nothing here touches storage.
//!
//! # Invariants
//! - After [`AttendanceMatrix::seed`] every vector is at least as long as the
//!   session calendar. Vectors are padded with `false`, never truncated.
//! - Toggles apply in call order; each flips exactly one cell.

use std::error::Error;
use std::fmt::{Display, Formatter};

use chrono::NaiveDate;

use crate::calendar::Period;
use crate::models::{Group, Member, SubmitSnapshotRequest};

/// Index errors raised by matrix edits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatrixError {
    /// No member at this position.
    MemberIndexOutOfRange { index: usize, len: usize },
    /// No member with this id.
    UnknownMember(String),
    /// No session at this position.
    SessionOutOfRange { index: usize, len: usize },
}

impl Display for MatrixError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MemberIndexOutOfRange { index, len } => {
                write!(f, "member index {index} out of range for {len} members")
            }
            Self::UnknownMember(id) => write!(f, "unknown member: {id}"),
            Self::SessionOutOfRange { index, len } => {
                write!(f, "session index {index} out of range for {len} session dates")
            }
        }
    }
}

impl Error for MatrixError {}

/// Pad `marks` with `false` up to `len`. Never shrinks.
fn pad(marks: &mut Vec<bool>, len: usize) {
    if marks.len() < len {
        marks.resize(len, false);
    }
}

/// Editable attendance grid for one class and period.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceMatrix {
    members: Vec<Member>,
    session_dates: Vec<NaiveDate>,
}

impl AttendanceMatrix {
    /// Seed a matrix from a roster, padding every member to the calendar.
    pub fn seed(roster: Vec<Member>, session_dates: Vec<NaiveDate>) -> Self {
        let mut matrix = Self {
            members: roster,
            session_dates,
        };
        matrix.reconcile();
        matrix
    }

    /// Pad every short vector to the session count. Idempotent.
    pub fn reconcile(&mut self) {
        let len = self.session_dates.len();
        for member in &mut self.members {
            pad(&mut member.attendance, len);
        }
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn session_dates(&self) -> &[NaiveDate] {
        &self.session_dates
    }

    pub fn member_ids(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|m| m.id.as_str())
    }

    /// Copy marks from a previously stored snapshot for members with the
    /// same id. Marks beyond the current calendar are ignored.
    pub fn overlay(&mut self, previous: &[Member]) {
        let len = self.session_dates.len();
        for member in &mut self.members {
            if let Some(prior) = previous.iter().find(|p| !p.id.is_empty() && p.id == member.id) {
                for (slot, mark) in member.attendance.iter_mut().zip(&prior.attendance).take(len) {
                    *slot = *mark;
                }
            }
        }
    }

    /// Flip the mark of the member at `member_index` for `session_index`.
    ///
    /// A vector still shorter than the calendar is padded first.
    pub fn toggle(&mut self, member_index: usize, session_index: usize) -> Result<bool, MatrixError> {
        let cell = self.cell_mut(member_index, session_index)?;
        *cell = !*cell;
        Ok(*cell)
    }

    /// Flip a mark addressing the member by id.
    pub fn toggle_member(&mut self, member_id: &str, session_index: usize) -> Result<bool, MatrixError> {
        let index = self.index_of(member_id)?;
        self.toggle(index, session_index)
    }

    /// Set the mark of the member at `member_index` explicitly.
    pub fn set_at(
        &mut self,
        member_index: usize,
        session_index: usize,
        present: bool,
    ) -> Result<(), MatrixError> {
        *self.cell_mut(member_index, session_index)? = present;
        Ok(())
    }

    /// Set a mark explicitly, addressing the member by id.
    pub fn set(
        &mut self,
        member_id: &str,
        session_index: usize,
        present: bool,
    ) -> Result<(), MatrixError> {
        let index = self.index_of(member_id)?;
        self.set_at(index, session_index, present)
    }

    /// The padded cell at `(member_index, session_index)`.
    fn cell_mut(&mut self, member_index: usize, session_index: usize) -> Result<&mut bool, MatrixError> {
        let len = self.session_dates.len();
        if session_index >= len {
            return Err(MatrixError::SessionOutOfRange {
                index: session_index,
                len,
            });
        }
        let count = self.members.len();
        let member = self
            .members
            .get_mut(member_index)
            .ok_or(MatrixError::MemberIndexOutOfRange {
                index: member_index,
                len: count,
            })?;

        pad(&mut member.attendance, len);
        Ok(&mut member.attendance[session_index])
    }

    /// Append a new member marked absent for every session.
    pub fn insert_member(&mut self, mut member: Member) -> &Member {
        member.attendance = vec![false; self.session_dates.len()];
        self.members.push(member);
        &self.members[self.members.len() - 1]
    }

    /// Present marks within the calendar.
    pub fn attended(&self) -> usize {
        let len = self.session_dates.len();
        self.members
            .iter()
            .map(|m| m.attendance.iter().take(len).filter(|present| **present).count())
            .sum()
    }

    /// Sessions × members.
    pub fn possible(&self) -> usize {
        self.session_dates.len() * self.members.len()
    }

    /// Submit payload carrying the full matrix and the class metadata.
    pub fn to_submission(&self, group: &Group, period: Period) -> SubmitSnapshotRequest {
        SubmitSnapshotRequest {
            year: period.year,
            month: period.month,
            group_name: Some(group.name.clone()),
            teacher_name: Some(group.teacher_name.clone()),
            elder_name: Some(group.elder_name.clone()),
            session_dates: Some(self.session_dates.clone()),
            members: Some(self.members.clone()),
        }
    }

    fn index_of(&self, member_id: &str) -> Result<usize, MatrixError> {
        self.members
            .iter()
            .position(|m| m.id == member_id)
            .ok_or_else(|| MatrixError::UnknownMember(member_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::session_dates;

    fn member(name: &str, marks: &[bool]) -> Member {
        Member {
            id: name.to_lowercase(),
            full_name: name.to_string(),
            attendance: marks.to_vec(),
            ..Default::default()
        }
    }

    #[test]
    fn test_seed_pads_without_shrinking() {
        let dates = session_dates(2025, 3, 6);
        let matrix = AttendanceMatrix::seed(
            vec![
                member("Alice", &[true]),
                member("Bob", &[true, false, true, false, true, true]),
            ],
            dates,
        );

        assert_eq!(
            matrix.members()[0].attendance,
            vec![true, false, false, false, false]
        );
        // Longer history is kept intact.
        assert_eq!(matrix.members()[1].attendance.len(), 6);
    }

    #[test]
    fn test_seed_is_idempotent() {
        let dates = session_dates(2025, 3, 6);
        let roster = vec![member("Alice", &[]), member("Bob", &[true])];

        let once = AttendanceMatrix::seed(roster, dates.clone());
        let twice = AttendanceMatrix::seed(once.members().to_vec(), dates);
        assert_eq!(once, twice);

        let mut again = once.clone();
        again.reconcile();
        assert_eq!(again, once);
    }

    #[test]
    fn test_toggle_flips_single_cell() {
        let mut matrix = AttendanceMatrix::seed(
            vec![member("Alice", &[]), member("Bob", &[])],
            session_dates(2025, 3, 6),
        );

        assert_eq!(matrix.toggle(0, 2), Ok(true));
        assert_eq!(
            matrix.members()[0].attendance,
            vec![false, false, true, false, false]
        );
        assert_eq!(matrix.members()[1].attendance, vec![false; 5]);

        assert_eq!(matrix.toggle(0, 2), Ok(false));
        assert_eq!(matrix.members()[0].attendance, vec![false; 5]);
    }

    #[test]
    fn test_toggle_extends_short_vector_first() {
        let mut matrix = AttendanceMatrix::seed(vec![], session_dates(2025, 3, 6));
        // Simulate a roster row that bypassed reconciliation.
        matrix.members.push(member("Late", &[true]));

        assert_eq!(matrix.toggle(0, 4), Ok(true));
        assert_eq!(
            matrix.members()[0].attendance,
            vec![true, false, false, false, true]
        );
    }

    #[test]
    fn test_toggle_rejects_out_of_range() {
        let mut matrix =
            AttendanceMatrix::seed(vec![member("Alice", &[])], session_dates(2025, 4, 6));

        assert_eq!(
            matrix.toggle(0, 4),
            Err(MatrixError::SessionOutOfRange { index: 4, len: 4 })
        );
        assert_eq!(
            matrix.toggle(3, 0),
            Err(MatrixError::MemberIndexOutOfRange { index: 3, len: 1 })
        );
        assert_eq!(
            matrix.toggle_member("ghost", 0),
            Err(MatrixError::UnknownMember("ghost".into()))
        );
        assert_eq!(matrix.members()[0].attendance, vec![false; 4]);
    }

    #[test]
    fn test_set_is_explicit() {
        let mut matrix =
            AttendanceMatrix::seed(vec![member("Alice", &[])], session_dates(2025, 3, 6));
        matrix.set("alice", 1, true).unwrap();
        matrix.set("alice", 1, true).unwrap();
        assert!(matrix.members()[0].attendance[1]);
        matrix.set("alice", 1, false).unwrap();
        assert!(!matrix.members()[0].attendance[1]);
    }

    #[test]
    fn test_insert_member_sized_to_calendar() {
        let mut matrix = AttendanceMatrix::seed(vec![], session_dates(2025, 3, 6));
        let inserted = matrix.insert_member(member("Carol", &[true, true]));
        assert_eq!(inserted.attendance, vec![false; 5]);
        assert_eq!(matrix.possible(), 5);
    }

    #[test]
    fn test_overlay_matches_by_id() {
        let mut matrix = AttendanceMatrix::seed(
            vec![member("Alice", &[]), member("Bob", &[])],
            session_dates(2025, 3, 6),
        );
        matrix.overlay(&[
            member("Bob", &[true, true, false, false, false, true, true]),
            member("Zed", &[true]),
        ]);

        assert_eq!(matrix.members()[0].attendance, vec![false; 5]);
        assert_eq!(
            matrix.members()[1].attendance,
            vec![true, true, false, false, false]
        );
    }

    #[test]
    fn test_counts() {
        let mut matrix = AttendanceMatrix::seed(
            vec![member("Alice", &[]), member("Bob", &[])],
            session_dates(2025, 3, 6),
        );
        matrix.toggle_member("alice", 0).unwrap();
        matrix.toggle_member("alice", 1).unwrap();
        assert_eq!(matrix.attended(), 2);
        assert_eq!(matrix.possible(), 10);
    }

    #[test]
    fn test_set_pads_short_vector_before_assigning() {
        let mut matrix = AttendanceMatrix::seed(vec![], session_dates(2025, 3, 6));
        matrix.members.push(member("Late", &[]));

        matrix.set("late", 3, false).unwrap();
        assert_eq!(matrix.members()[0].attendance, vec![false; 5]);

        matrix.set_at(0, 3, true).unwrap();
        matrix.set_at(0, 3, true).unwrap();
        assert_eq!(
            matrix.members()[0].attendance,
            vec![false, false, false, true, false]
        );
    }
}
