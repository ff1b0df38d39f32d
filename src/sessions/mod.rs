//! Attendance edit sessions.
//!
//! An edit session owns one [`AttendanceMatrix`] seeded from the roster when
//! it is opened. Live roster changes reach sessions only as a drift flag: the
//! watcher compares the pushed member ids with the matrix and never edits
//! the matrix itself. Roster and matrix meet again only at submit.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::calendar::Period;
use crate::db::{ChangeEvent, ChangeKind, RecordStore, RosterStore};
use crate::errors::AppError;
use crate::matrix::AttendanceMatrix;
use crate::models::{AttendanceSnapshot, CreateMemberRequest, Group, Member};
use crate::report::{percentage, round2};

/// One open editing session.
#[derive(Debug, Clone)]
pub struct EditSession {
    pub id: String,
    pub group: Group,
    pub period: Period,
    pub matrix: AttendanceMatrix,
    pub roster_drift: bool,
    pub opened_by: Option<String>,
    pub opened_at: String,
    pub last_touched: Instant,
}

/// Serializable state of a session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: String,
    pub group_id: String,
    pub group_name: String,
    pub year: i32,
    pub month: u32,
    pub record_id: String,
    pub session_dates: Vec<NaiveDate>,
    pub members: Vec<Member>,
    pub attended: usize,
    pub possible: usize,
    pub rate: f64,
    pub roster_drift: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opened_by: Option<String>,
    pub opened_at: String,
}

impl From<&EditSession> for SessionView {
    fn from(session: &EditSession) -> Self {
        let attended = session.matrix.attended();
        let possible = session.matrix.possible();
        Self {
            id: session.id.clone(),
            group_id: session.group.id.clone(),
            group_name: session.group.name.clone(),
            year: session.period.year,
            month: session.period.month,
            record_id: session.period.record_id(),
            session_dates: session.matrix.session_dates().to_vec(),
            members: session.matrix.members().to_vec(),
            attended,
            possible,
            rate: round2(percentage(attended, possible)),
            roster_drift: session.roster_drift,
            opened_by: session.opened_by.clone(),
            opened_at: session.opened_at.clone(),
        }
    }
}

/// Cell edit addressed by member position or member id.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ToggleRequest {
    #[serde(default)]
    pub member_index: Option<usize>,
    #[serde(default)]
    pub member_id: Option<String>,
    pub session_index: usize,
    /// Set the mark to this value instead of flipping it.
    #[serde(default)]
    pub present: Option<bool>,
}

/// Registry of open edit sessions.
#[derive(Default)]
pub struct EditSessions {
    sessions: RwLock<HashMap<String, EditSession>>,
}

impl EditSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a new session for a class and period.
    ///
    /// Marks already submitted for the period are carried over for members
    /// whose id still matches.
    pub async fn open(
        &self,
        roster: &RosterStore,
        records: &RecordStore,
        group_id: &str,
        period: Period,
        default_weekday: u32,
        opened_by: Option<String>,
    ) -> Result<SessionView, AppError> {
        let group = roster
            .get_group(group_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Class {} not found", group_id)))?;

        let dates = period.session_dates(group.weekday_or(default_weekday));
        let mut matrix = AttendanceMatrix::seed(group.members.clone(), dates);
        if let Some(previous) = records.get(group_id, &period.record_id()).await? {
            matrix.overlay(&previous.members);
        }

        let session = EditSession {
            id: uuid::Uuid::new_v4().to_string(),
            group,
            period,
            matrix,
            roster_drift: false,
            opened_by,
            opened_at: chrono::Utc::now().to_rfc3339(),
            last_touched: Instant::now(),
        };
        let view = SessionView::from(&session);

        tracing::info!(
            "Opened edit session {} for class {} period {}",
            session.id,
            group_id,
            period.record_id()
        );
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session);
        Ok(view)
    }

    pub async fn view(&self, id: &str) -> Result<SessionView, AppError> {
        let sessions = self.sessions.read().await;
        sessions
            .get(id)
            .map(SessionView::from)
            .ok_or_else(|| not_found(id))
    }

    /// Apply one cell edit.
    pub async fn toggle(&self, id: &str, request: &ToggleRequest) -> Result<SessionView, AppError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(id).ok_or_else(|| not_found(id))?;
        session.last_touched = Instant::now();

        let matrix = &mut session.matrix;
        match (&request.member_id, request.member_index, request.present) {
            (Some(member_id), _, Some(present)) => {
                matrix.set(member_id, request.session_index, present)?
            }
            (Some(member_id), _, None) => {
                matrix.toggle_member(member_id, request.session_index)?;
            }
            (None, Some(index), Some(present)) => {
                matrix.set_at(index, request.session_index, present)?
            }
            (None, Some(index), None) => {
                matrix.toggle(index, request.session_index)?;
            }
            (None, None, _) => {
                return Err(AppError::Validation(
                    "Either memberId or memberIndex is required".to_string(),
                ))
            }
        }

        Ok(SessionView::from(&*session))
    }

    /// Add a member to the class roster and to the open matrix.
    ///
    /// The registry stays locked across both writes so the roster watcher
    /// sees the new member already present in the matrix.
    pub async fn insert_member(
        &self,
        roster: &RosterStore,
        id: &str,
        request: &CreateMemberRequest,
    ) -> Result<SessionView, AppError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(id).ok_or_else(|| not_found(id))?;

        let member = roster.add_member(&session.group.id, request).await?;
        session.last_touched = Instant::now();
        session.group.members.push(member.clone());
        session.matrix.insert_member(member);

        Ok(SessionView::from(&*session))
    }

    /// Persist the session's matrix as the snapshot of its period and
    /// close the session.
    pub async fn submit(
        &self,
        records: &RecordStore,
        id: &str,
    ) -> Result<AttendanceSnapshot, AppError> {
        let (group_id, submission) = {
            let sessions = self.sessions.read().await;
            let session = sessions.get(id).ok_or_else(|| not_found(id))?;
            (
                session.group.id.clone(),
                session.matrix.to_submission(&session.group, session.period),
            )
        };

        let snapshot = records.submit(&group_id, &submission).await?;
        self.sessions.write().await.remove(id);
        tracing::debug!("Closed edit session {} after submit", id);
        Ok(snapshot)
    }

    /// Discard a session without saving.
    pub async fn close(&self, id: &str) -> Result<(), AppError> {
        match self.sessions.write().await.remove(id) {
            Some(_) => {
                tracing::debug!("Closed edit session {}", id);
                Ok(())
            }
            None => Err(not_found(id)),
        }
    }

    /// Drop sessions not edited for `max_idle`. Returns how many were dropped.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.last_touched.elapsed() < max_idle);
        let evicted = before - sessions.len();
        if evicted > 0 {
            tracing::info!("Evicted {} idle edit sessions", evicted);
        }
        evicted
    }

    /// Recompute the drift flag of sessions on the changed class.
    pub async fn apply_roster_change(&self, event: &ChangeEvent) {
        let mut sessions = self.sessions.write().await;
        for session in sessions.values_mut().filter(|s| s.group.id == event.id) {
            let drift = match (event.kind, &event.fields) {
                (ChangeKind::Removed, _) | (_, None) => true,
                (_, Some(fields)) => {
                    let live: BTreeSet<&str> = fields
                        .get("members")
                        .and_then(|m| m.as_array())
                        .map(|members| {
                            members
                                .iter()
                                .filter_map(|m| m.get("id").and_then(|id| id.as_str()))
                                .collect()
                        })
                        .unwrap_or_default();
                    let editing: BTreeSet<&str> = session.matrix.member_ids().collect();
                    live != editing
                }
            };
            if drift && !session.roster_drift {
                tracing::warn!(
                    "Roster of class {} changed under edit session {}",
                    event.id,
                    session.id
                );
            }
            session.roster_drift = drift;
        }
    }
}

fn not_found(id: &str) -> AppError {
    AppError::NotFound(format!("Edit session {} not found", id))
}

/// Feed roster changes into the session registry until the store goes away.
pub fn spawn_roster_watch(roster: &RosterStore, sessions: Arc<EditSessions>) -> JoinHandle<()> {
    let mut feed = roster.subscribe();
    tokio::spawn(async move {
        loop {
            match feed.next().await {
                Ok(Some(event)) => sessions.apply_roster_change(&event).await,
                Ok(None) => break,
                Err(e) => tracing::warn!("Roster feed error: {}", e),
            }
        }
    })
}

/// Periodically evict sessions idle for longer than `max_idle`.
pub fn spawn_idle_sweep(sessions: Arc<EditSessions>, max_idle: Duration) -> JoinHandle<()> {
    let period = (max_idle / 4).max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            sessions.evict_idle(max_idle).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::temp_store;
    use crate::models::{CreateGroupRequest, UpdateMemberRequest};

    async fn setup() -> (RosterStore, RecordStore, Group, tempfile::TempDir) {
        let (store, dir) = temp_store().await;
        let roster = RosterStore::new(store.clone());
        let records = RecordStore::new(store);
        let group = roster
            .create_group(&CreateGroupRequest {
                name: "G1".into(),
                members: vec![
                    CreateMemberRequest::named("Alice"),
                    CreateMemberRequest::named("Bob"),
                ],
                ..Default::default()
            })
            .await
            .unwrap();
        (roster, records, group, dir)
    }

    fn march() -> Period {
        Period::new(2025, 3).unwrap()
    }

    #[tokio::test]
    async fn test_open_toggle_submit() {
        let (roster, records, group, _dir) = setup().await;
        let sessions = EditSessions::new();

        let view = sessions
            .open(&roster, &records, &group.id, march(), 6, Some("t1".into()))
            .await
            .unwrap();
        assert_eq!(view.session_dates.len(), 5);
        assert!(view.members.iter().all(|m| m.attendance == vec![false; 5]));

        for session_index in [0, 1] {
            sessions
                .toggle(
                    &view.id,
                    &ToggleRequest {
                        member_index: Some(0),
                        session_index,
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
        }

        let view = sessions.view(&view.id).await.unwrap();
        assert_eq!(view.attended, 2);
        assert_eq!(view.possible, 10);
        assert_eq!(view.rate, 20.0);

        let snapshot = sessions.submit(&records, &view.id).await.unwrap();
        assert_eq!(snapshot.record_id, "2025-3");
        assert_eq!(snapshot.group_name, "G1");
        assert_eq!(snapshot.members[0].attendance, vec![true, true, false, false, false]);
    }

    #[tokio::test]
    async fn test_reopen_carries_submitted_marks() {
        let (roster, records, group, _dir) = setup().await;
        let sessions = EditSessions::new();

        let first = sessions
            .open(&roster, &records, &group.id, march(), 6, None)
            .await
            .unwrap();
        let bob = group.members[1].id.clone();
        sessions
            .toggle(
                &first.id,
                &ToggleRequest {
                    member_id: Some(bob.clone()),
                    session_index: 3,
                    present: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        sessions.submit(&records, &first.id).await.unwrap();
        assert!(matches!(
            sessions.view(&first.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(sessions.sessions.read().await.is_empty());

        let second = sessions
            .open(&roster, &records, &group.id, march(), 6, None)
            .await
            .unwrap();
        let bob_row = second.members.iter().find(|m| m.id == bob).unwrap();
        assert_eq!(bob_row.attendance, vec![false, false, false, true, false]);
    }

    #[tokio::test]
    async fn test_toggle_requires_member_reference() {
        let (roster, records, group, _dir) = setup().await;
        let sessions = EditSessions::new();
        let view = sessions
            .open(&roster, &records, &group.id, march(), 6, None)
            .await
            .unwrap();

        let err = sessions
            .toggle(&view.id, &ToggleRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = sessions
            .toggle(
                &view.id,
                &ToggleRequest {
                    member_index: Some(0),
                    session_index: 9,
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_open_unknown_group() {
        let (roster, records, _group, _dir) = setup().await;
        let sessions = EditSessions::new();
        let err = sessions
            .open(&roster, &records, "missing", march(), 6, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_roster_push_flags_drift_without_touching_matrix() {
        let (roster, records, group, _dir) = setup().await;
        let sessions = Arc::new(EditSessions::new());
        let watcher = spawn_roster_watch(&roster, sessions.clone());

        let view = sessions
            .open(&roster, &records, &group.id, march(), 6, None)
            .await
            .unwrap();
        sessions
            .toggle(
                &view.id,
                &ToggleRequest {
                    member_index: Some(0),
                    session_index: 0,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        // An edit that keeps the member set does not count as drift.
        roster
            .update_member(
                &group.id,
                &group.members[0].id,
                &UpdateMemberRequest {
                    phone: Some("555".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        assert!(!sessions.view(&view.id).await.unwrap().roster_drift);

        // Another editor adds a member directly to the roster.
        roster
            .add_member(&group.id, &CreateMemberRequest::named("Carol"))
            .await
            .unwrap();
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        let after = sessions.view(&view.id).await.unwrap();
        assert!(after.roster_drift);
        assert_eq!(after.members.len(), 2);
        assert_eq!(after.attended, 1);

        watcher.abort();
    }

    #[tokio::test]
    async fn test_insert_through_session_is_not_drift() {
        let (roster, records, group, _dir) = setup().await;
        let sessions = Arc::new(EditSessions::new());
        let watcher = spawn_roster_watch(&roster, sessions.clone());

        let view = sessions
            .open(&roster, &records, &group.id, march(), 6, None)
            .await
            .unwrap();
        let after = sessions
            .insert_member(&roster, &view.id, &CreateMemberRequest::named("Dan"))
            .await
            .unwrap();
        assert_eq!(after.members.len(), 3);
        assert_eq!(after.members[2].attendance, vec![false; 5]);

        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        assert!(!sessions.view(&view.id).await.unwrap().roster_drift);

        let live = roster.get_group(&group.id).await.unwrap().unwrap();
        assert_eq!(live.members.len(), 3);

        watcher.abort();
    }

    #[tokio::test]
    async fn test_idle_sessions_are_evicted() {
        let (roster, records, group, _dir) = setup().await;
        let sessions = EditSessions::new();

        let idle = sessions
            .open(&roster, &records, &group.id, march(), 6, None)
            .await
            .unwrap();
        assert_eq!(sessions.evict_idle(Duration::from_secs(3600)).await, 0);
        assert_eq!(sessions.sessions.read().await.len(), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        let fresh = sessions
            .open(&roster, &records, &group.id, march(), 6, None)
            .await
            .unwrap();

        assert_eq!(sessions.evict_idle(Duration::from_millis(100)).await, 1);
        assert!(matches!(
            sessions.view(&idle.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(sessions.view(&fresh.id).await.is_ok());
    }
}
