//! Class member model.

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// A member enrolled in a class.
///
/// Members are embedded in their class document and addressed by `id`,
/// which is assigned on insertion. `attendance` holds one mark per session
/// date of the member's current editing period and may be shorter than the
/// calendar; it is padded with `false` before use and never truncated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    #[serde(default)]
    pub id: String,
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub residence: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prayer_cell: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub membership_status: Option<String>,
    #[serde(default)]
    pub baptized: bool,
    #[serde(default)]
    pub attendance: Vec<bool>,
}

impl Member {
    /// Build a member from a request, assigning a fresh id.
    pub fn from_request(request: &CreateMemberRequest) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            full_name: request.full_name.trim().to_string(),
            residence: request.residence.clone(),
            prayer_cell: request.prayer_cell.clone(),
            phone: request.phone.clone(),
            email: request.email.clone(),
            membership_status: request.membership_status.clone(),
            baptized: request.baptized,
            attendance: request.attendance.clone(),
        }
    }

    /// Apply the fields present in `request`.
    pub fn apply(&mut self, request: &UpdateMemberRequest) {
        if let Some(full_name) = &request.full_name {
            self.full_name = full_name.trim().to_string();
        }
        if request.residence.is_some() {
            self.residence = request.residence.clone();
        }
        if request.prayer_cell.is_some() {
            self.prayer_cell = request.prayer_cell.clone();
        }
        if request.phone.is_some() {
            self.phone = request.phone.clone();
        }
        if request.email.is_some() {
            self.email = request.email.clone();
        }
        if request.membership_status.is_some() {
            self.membership_status = request.membership_status.clone();
        }
        if let Some(baptized) = request.baptized {
            self.baptized = baptized;
        }
        if let Some(attendance) = &request.attendance {
            self.attendance = attendance.clone();
        }
    }
}

/// Request body for adding a member to a class.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateMemberRequest {
    pub full_name: String,
    #[serde(default)]
    pub residence: Option<String>,
    #[serde(default)]
    pub prayer_cell: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub membership_status: Option<String>,
    #[serde(default)]
    pub baptized: bool,
    #[serde(default)]
    pub attendance: Vec<bool>,
}

impl CreateMemberRequest {
    pub fn named(full_name: &str) -> Self {
        Self {
            full_name: full_name.to_string(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.full_name.trim().is_empty() {
            return Err(AppError::Validation("Member full name is required".to_string()));
        }
        Ok(())
    }
}

/// Request body for updating a member.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMemberRequest {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub residence: Option<String>,
    #[serde(default)]
    pub prayer_cell: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub membership_status: Option<String>,
    #[serde(default)]
    pub baptized: Option<bool>,
    #[serde(default)]
    pub attendance: Option<Vec<bool>>,
}

impl UpdateMemberRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        match &self.full_name {
            Some(name) if name.trim().is_empty() => Err(AppError::Validation(
                "Member full name cannot be empty".to_string(),
            )),
            _ => Ok(()),
        }
    }
}
