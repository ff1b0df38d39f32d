//! Attendance record persistence.
//!
//! Each class keeps at most one snapshot per month under a record id derived
//! from the period. Submitting merges into that document, so resubmitting a
//! month never creates a second record.

use serde_json::{Map, Value};

use super::roster::RosterStore;
use super::store::{to_fields, CollectionPath, DocPath, Document, DocumentStore, Filter, Scope, SetOptions};
use crate::calendar::Period;
use crate::errors::AppError;
use crate::models::{AttendanceSnapshot, SubmitSnapshotRequest, UpdateSnapshotRequest};

/// Subcollection name of attendance records under each class.
pub const ATTENDANCE_RECORDS: &str = "attendanceRecords";

/// Field stamped with the store's write time on submit.
pub const WRITTEN_AT: &str = "writtenAt";

/// Decode a stored record, taking `groupId` from the parent document.
pub fn snapshot_from_document(doc: &Document) -> Result<AttendanceSnapshot, AppError> {
    let mut snapshot: AttendanceSnapshot = doc.decode()?;
    if let Some(parent_id) = &doc.parent_id {
        snapshot.group_id = parent_id.clone();
    }
    Ok(snapshot)
}

/// Record persistence over `classes/{groupId}/attendanceRecords`.
#[derive(Clone)]
pub struct RecordStore {
    store: DocumentStore,
}

impl RecordStore {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }

    pub fn collection(group_id: &str) -> CollectionPath {
        RosterStore::collection().child(group_id, ATTENDANCE_RECORDS)
    }

    fn path(group_id: &str, record_id: &str) -> DocPath {
        Self::collection(group_id).doc(record_id)
    }

    /// Merge-write the snapshot for the request's period and stamp `writtenAt`.
    pub async fn submit(
        &self,
        group_id: &str,
        request: &SubmitSnapshotRequest,
    ) -> Result<AttendanceSnapshot, AppError> {
        let period = Period::new(request.year, request.month)?;
        let record_id = period.record_id();

        let mut fields = Map::new();
        fields.insert("recordId".into(), Value::String(record_id.clone()));
        fields.extend(to_fields(request)?);
        fields.insert(
            WRITTEN_AT.into(),
            Value::String(self.store.server_timestamp()),
        );

        let doc = self
            .store
            .set(&Self::path(group_id, &record_id), fields, SetOptions::merge())
            .await?;

        tracing::info!(
            "Submitted attendance {} for class {}",
            record_id,
            group_id
        );
        snapshot_from_document(&doc)
    }

    /// All snapshots of a class, unordered. Empty for unknown classes.
    pub async fn fetch_all(&self, group_id: &str) -> Result<Vec<AttendanceSnapshot>, AppError> {
        let docs = self
            .store
            .list(&Scope::Collection(Self::collection(group_id)), &[])
            .await?;
        docs.iter().map(snapshot_from_document).collect()
    }

    /// Get one snapshot.
    pub async fn get(
        &self,
        group_id: &str,
        record_id: &str,
    ) -> Result<Option<AttendanceSnapshot>, AppError> {
        match self.store.get(&Self::path(group_id, record_id)).await? {
            Some(doc) => Ok(Some(snapshot_from_document(&doc)?)),
            None => Ok(None),
        }
    }

    /// Patch fields of an existing snapshot.
    pub async fn update(
        &self,
        group_id: &str,
        record_id: &str,
        request: &UpdateSnapshotRequest,
    ) -> Result<AttendanceSnapshot, AppError> {
        let path = Self::path(group_id, record_id);
        let doc = self
            .store
            .update(&path, to_fields(request)?)
            .await
            .map_err(|e| match e {
                AppError::NotFound(_) => AppError::NotFound(format!(
                    "Attendance record {} not found for class {}",
                    record_id, group_id
                )),
                other => other,
            })?;
        snapshot_from_document(&doc)
    }

    /// Delete one snapshot.
    pub async fn delete(&self, group_id: &str, record_id: &str) -> Result<(), AppError> {
        if !self.store.delete(&Self::path(group_id, record_id)).await? {
            return Err(AppError::NotFound(format!(
                "Attendance record {} not found for class {}",
                record_id, group_id
            )));
        }
        tracing::info!("Deleted attendance {} for class {}", record_id, group_id);
        Ok(())
    }

    /// Snapshots across all classes submitted in `[from, to)`.
    pub async fn written_between(
        &self,
        from: Option<String>,
        to: Option<String>,
    ) -> Result<Vec<AttendanceSnapshot>, AppError> {
        let docs = self
            .store
            .list(
                &Scope::Group(ATTENDANCE_RECORDS.to_string()),
                &[Filter::range(WRITTEN_AT, from, to)],
            )
            .await?;
        docs.iter().map(snapshot_from_document).collect()
    }
}
