//! Class and roster endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{success, ApiResult};
use crate::auth::{AuthContext, ADMIN_ONLY, ANY_ROLE, STAFF};
use crate::errors::AppError;
use crate::models::{
    CreateGroupRequest, CreateMemberRequest, Group, Member, UpdateGroupRequest,
    UpdateMemberRequest,
};
use crate::AppState;

/// GET /api/groups - List all classes.
pub async fn list_groups(State(state): State<AppState>, auth: AuthContext) -> ApiResult<Vec<Group>> {
    auth.require("list classes", ANY_ROLE)?;
    success(state.roster.list_groups().await?)
}

/// GET /api/groups/:id - Get a single class with its roster.
pub async fn get_group(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> ApiResult<Group> {
    auth.require("read classes", ANY_ROLE)?;
    match state.roster.get_group(&id).await? {
        Some(group) => success(group),
        None => Err(AppError::NotFound(format!("Class {} not found", id))),
    }
}

/// POST /api/groups - Create a class.
pub async fn create_group(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<CreateGroupRequest>,
) -> ApiResult<Group> {
    auth.require("create classes", ADMIN_ONLY)?;
    request.validate()?;
    success(state.roster.create_group(&request).await?)
}

/// PUT /api/groups/:id - Update class metadata.
pub async fn update_group(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<String>,
    Json(request): Json<UpdateGroupRequest>,
) -> ApiResult<Group> {
    auth.require("update classes", ADMIN_ONLY)?;
    request.validate()?;
    success(state.roster.update_group(&id, &request).await?)
}

/// DELETE /api/groups/:id - Delete a class. Its attendance records are kept.
pub async fn delete_group(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> ApiResult<()> {
    auth.require("delete classes", ADMIN_ONLY)?;
    state.roster.delete_group(&id).await?;
    success(())
}

/// POST /api/groups/:id/members - Add a member to a class roster.
pub async fn add_member(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<String>,
    Json(request): Json<CreateMemberRequest>,
) -> ApiResult<Member> {
    auth.require("add members", STAFF)?;
    request.validate()?;
    success(state.roster.add_member(&id, &request).await?)
}

/// PUT /api/groups/:id/members/:member_id - Update a member.
pub async fn update_member(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((id, member_id)): Path<(String, String)>,
    Json(request): Json<UpdateMemberRequest>,
) -> ApiResult<Member> {
    auth.require("update members", STAFF)?;
    request.validate()?;
    success(state.roster.update_member(&id, &member_id, &request).await?)
}

/// DELETE /api/groups/:id/members/:member_id - Remove a member.
pub async fn remove_member(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((id, member_id)): Path<(String, String)>,
) -> ApiResult<()> {
    auth.require("remove members", STAFF)?;
    state.roster.remove_member(&id, &member_id).await?;
    success(())
}
