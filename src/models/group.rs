//! Class (roster group) model.

use serde::{Deserialize, Serialize};

use super::{CreateMemberRequest, Member};
use crate::errors::AppError;

fn validate_weekday(weekday: Option<u32>) -> Result<(), AppError> {
    match weekday {
        Some(day) if day > 6 => Err(AppError::Validation(format!(
            "Session weekday must be between 0 (Sunday) and 6 (Saturday), got {}",
            day
        ))),
        _ => Ok(()),
    }
}

/// A class with its teacher, elder and embedded member roster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub teacher_name: String,
    #[serde(default)]
    pub elder_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_type: Option<String>,
    /// Overrides the configured session weekday for this class.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_weekday: Option<u32>,
    #[serde(default)]
    pub members: Vec<Member>,
}

impl Group {
    pub fn weekday_or(&self, default: u32) -> u32 {
        self.session_weekday.unwrap_or(default)
    }
}

/// Request body for creating a class.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(default)]
    pub teacher_name: String,
    #[serde(default)]
    pub elder_name: String,
    #[serde(default)]
    pub group_type: Option<String>,
    #[serde(default)]
    pub session_weekday: Option<u32>,
    #[serde(default)]
    pub members: Vec<CreateMemberRequest>,
}

impl CreateGroupRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::Validation("Class name is required".to_string()));
        }
        validate_weekday(self.session_weekday)?;
        self.members.iter().try_for_each(CreateMemberRequest::validate)
    }
}

/// Request body for updating class metadata. Members are managed separately.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGroupRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub teacher_name: Option<String>,
    #[serde(default)]
    pub elder_name: Option<String>,
    #[serde(default)]
    pub group_type: Option<String>,
    #[serde(default)]
    pub session_weekday: Option<u32>,
}

impl UpdateGroupRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(AppError::Validation("Class name cannot be empty".to_string()));
            }
        }
        validate_weekday(self.session_weekday)
    }
}
