//! Roster store: classes and their embedded member lists.

use serde_json::{Map, Value};

use super::store::{to_fields, CollectionPath, DocPath, DocumentStore, Scope, SetOptions, Subscription};
use crate::errors::AppError;
use crate::models::{
    CreateGroupRequest, CreateMemberRequest, Group, Member, UpdateGroupRequest,
    UpdateMemberRequest,
};

/// Collection holding one document per class.
pub const CLASSES: &str = "classes";

/// Roster operations over the `classes` collection.
///
/// Member edits rewrite the whole embedded `members` list of the class
/// document; concurrent writers race with last-write-wins.
#[derive(Clone)]
pub struct RosterStore {
    store: DocumentStore,
}

impl RosterStore {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }

    pub fn collection() -> CollectionPath {
        CollectionPath::root(CLASSES)
    }

    fn path(id: &str) -> DocPath {
        Self::collection().doc(id)
    }

    /// List all classes ordered by name.
    pub async fn list_groups(&self) -> Result<Vec<Group>, AppError> {
        let docs = self
            .store
            .list(&Scope::Collection(Self::collection()), &[])
            .await?;

        let mut groups = docs
            .iter()
            .map(|doc| doc.decode::<Group>())
            .collect::<Result<Vec<_>, _>>()?;
        groups.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(groups)
    }

    /// Get a class by ID.
    pub async fn get_group(&self, id: &str) -> Result<Option<Group>, AppError> {
        match self.store.get(&Self::path(id)).await? {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }

    async fn require_group(&self, id: &str) -> Result<Group, AppError> {
        self.get_group(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Class {} not found", id)))
    }

    /// Create a new class with its initial members.
    pub async fn create_group(&self, request: &CreateGroupRequest) -> Result<Group, AppError> {
        let group = Group {
            id: uuid::Uuid::new_v4().to_string(),
            name: request.name.trim().to_string(),
            teacher_name: request.teacher_name.clone(),
            elder_name: request.elder_name.clone(),
            group_type: request.group_type.clone(),
            session_weekday: request.session_weekday,
            members: request.members.iter().map(Member::from_request).collect(),
        };

        let mut fields = to_fields(&group)?;
        fields.remove("id");
        self.store
            .set(&Self::path(&group.id), fields, SetOptions::default())
            .await?;

        tracing::info!("Created class {} ({})", group.name, group.id);
        Ok(group)
    }

    /// Update class metadata. Only the fields present in the request are written.
    pub async fn update_group(
        &self,
        id: &str,
        request: &UpdateGroupRequest,
    ) -> Result<Group, AppError> {
        let mut group = self.require_group(id).await?;
        let mut fields = Map::new();

        if let Some(name) = &request.name {
            group.name = name.trim().to_string();
            fields.insert("name".into(), Value::String(group.name.clone()));
        }
        if let Some(teacher_name) = &request.teacher_name {
            group.teacher_name = teacher_name.clone();
            fields.insert("teacherName".into(), Value::String(teacher_name.clone()));
        }
        if let Some(elder_name) = &request.elder_name {
            group.elder_name = elder_name.clone();
            fields.insert("elderName".into(), Value::String(elder_name.clone()));
        }
        if let Some(group_type) = &request.group_type {
            group.group_type = Some(group_type.clone());
            fields.insert("groupType".into(), Value::String(group_type.clone()));
        }
        if let Some(weekday) = request.session_weekday {
            group.session_weekday = Some(weekday);
            fields.insert("sessionWeekday".into(), Value::from(weekday));
        }

        if !fields.is_empty() {
            self.store.update(&Self::path(id), fields).await?;
        }
        Ok(group)
    }

    /// Delete a class. Its attendance records are left in place.
    pub async fn delete_group(&self, id: &str) -> Result<(), AppError> {
        if !self.store.delete(&Self::path(id)).await? {
            return Err(AppError::NotFound(format!("Class {} not found", id)));
        }
        tracing::info!("Deleted class {}", id);
        Ok(())
    }

    /// Append a member to a class roster.
    pub async fn add_member(
        &self,
        group_id: &str,
        request: &CreateMemberRequest,
    ) -> Result<Member, AppError> {
        let mut group = self.require_group(group_id).await?;
        let member = Member::from_request(request);
        group.members.push(member.clone());
        self.write_members(group_id, &group.members).await?;

        tracing::debug!("Added member {} to class {}", member.id, group_id);
        Ok(member)
    }

    /// Update one member of a class roster.
    pub async fn update_member(
        &self,
        group_id: &str,
        member_id: &str,
        request: &UpdateMemberRequest,
    ) -> Result<Member, AppError> {
        let mut group = self.require_group(group_id).await?;
        let member = group
            .members
            .iter_mut()
            .find(|m| m.id == member_id)
            .ok_or_else(|| {
                AppError::NotFound(format!("Member {} not found in class {}", member_id, group_id))
            })?;
        member.apply(request);
        let updated = member.clone();

        self.write_members(group_id, &group.members).await?;
        Ok(updated)
    }

    /// Remove one member from a class roster.
    pub async fn remove_member(&self, group_id: &str, member_id: &str) -> Result<(), AppError> {
        let mut group = self.require_group(group_id).await?;
        let before = group.members.len();
        group.members.retain(|m| m.id != member_id);
        if group.members.len() == before {
            return Err(AppError::NotFound(format!(
                "Member {} not found in class {}",
                member_id, group_id
            )));
        }

        self.write_members(group_id, &group.members).await
    }

    /// Watch the classes collection for roster changes.
    pub fn subscribe(&self) -> Subscription {
        self.store.subscribe(&Self::collection())
    }

    async fn write_members(&self, group_id: &str, members: &[Member]) -> Result<(), AppError> {
        let mut fields = Map::new();
        fields.insert("members".into(), serde_json::to_value(members)?);
        self.store.update(&Self::path(group_id), fields).await?;
        Ok(())
    }
}
