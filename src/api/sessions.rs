//! Attendance edit session endpoints.
//!
//! A session holds one class's attendance matrix on the server between
//! `open` and `submit`. Toggles never touch the store.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{success, ApiResult, PeriodQuery};
use crate::auth::{AuthContext, STAFF};
use crate::models::{AttendanceSnapshot, CreateMemberRequest};
use crate::sessions::{SessionView, ToggleRequest};
use crate::AppState;

/// POST /api/groups/:id/sessions - Open an edit session for a period.
pub async fn open_session(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<String>,
    Json(request): Json<PeriodQuery>,
) -> ApiResult<SessionView> {
    auth.require("edit attendance", STAFF)?;
    let period = request.resolve()?;

    let view = state
        .sessions
        .open(
            &state.roster,
            &state.records,
            &id,
            period,
            state.config.session_weekday,
            auth.current_user.clone(),
        )
        .await?;
    success(view)
}

/// GET /api/sessions/:sid - Current state of a session.
pub async fn get_session(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(sid): Path<String>,
) -> ApiResult<SessionView> {
    auth.require("edit attendance", STAFF)?;
    success(state.sessions.view(&sid).await?)
}

/// DELETE /api/sessions/:sid - Discard a session without saving.
pub async fn close_session(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(sid): Path<String>,
) -> ApiResult<()> {
    auth.require("edit attendance", STAFF)?;
    state.sessions.close(&sid).await?;
    success(())
}

/// POST /api/sessions/:sid/toggle - Flip or set one attendance cell.
pub async fn toggle_cell(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(sid): Path<String>,
    Json(request): Json<ToggleRequest>,
) -> ApiResult<SessionView> {
    auth.require("edit attendance", STAFF)?;
    success(state.sessions.toggle(&sid, &request).await?)
}

/// POST /api/sessions/:sid/members - Add a member to the roster and the open matrix.
pub async fn insert_session_member(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(sid): Path<String>,
    Json(request): Json<CreateMemberRequest>,
) -> ApiResult<SessionView> {
    auth.require("add members", STAFF)?;
    request.validate()?;
    success(
        state
            .sessions
            .insert_member(&state.roster, &sid, &request)
            .await?,
    )
}

/// POST /api/sessions/:sid/submit - Persist the session as the period's snapshot.
pub async fn submit_session(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(sid): Path<String>,
) -> ApiResult<AttendanceSnapshot> {
    auth.require("submit attendance", STAFF)?;
    success(state.sessions.submit(&state.records, &sid).await?)
}
