//! JSON document store on SQLite.
//!
//! Documents live in collections addressed by slash-separated paths
//! (`classes`, `classes/{id}/attendanceRecords`). A collection-group scope
//! queries every collection sharing a final name regardless of parent.
//! Writes publish a [`ChangeEvent`] to subscribers of the collection.

use std::fmt;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Mutex;

use crate::errors::AppError;

/// Buffered change events per subscriber before it starts lagging.
const CHANGE_BUFFER: usize = 256;

/// Path of a collection, optionally nested under a parent document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionPath {
    path: String,
    name: String,
    parent_id: Option<String>,
}

impl CollectionPath {
    pub fn root(name: &str) -> Self {
        Self {
            path: name.to_string(),
            name: name.to_string(),
            parent_id: None,
        }
    }

    /// Subcollection `name` under document `parent_id` of this collection.
    pub fn child(&self, parent_id: &str, name: &str) -> Self {
        Self {
            path: format!("{}/{}/{}", self.path, parent_id, name),
            name: name.to_string(),
            parent_id: Some(parent_id.to_string()),
        }
    }

    pub fn doc(&self, id: &str) -> DocPath {
        DocPath {
            collection: self.clone(),
            id: id.to_string(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Path of a single document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocPath {
    pub collection: CollectionPath,
    pub id: String,
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection.path, self.id)
    }
}

/// Target of a list query.
#[derive(Debug, Clone)]
pub enum Scope {
    /// One concrete collection.
    Collection(CollectionPath),
    /// Every collection with this name, across all parents.
    Group(String),
}

/// Predicate on a top-level document field.
#[derive(Debug, Clone)]
pub enum Filter {
    Eq {
        field: String,
        value: Value,
    },
    /// Lexicographic range on a string field, `from` inclusive, `to` exclusive.
    Range {
        field: String,
        from: Option<String>,
        to: Option<String>,
    },
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Filter::Eq {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn range(field: &str, from: Option<String>, to: Option<String>) -> Self {
        Filter::Range {
            field: field.to_string(),
            from,
            to,
        }
    }
}

/// Options for [`DocumentStore::set`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SetOptions {
    /// Merge top-level fields into an existing document instead of replacing it.
    pub merge: bool,
}

impl SetOptions {
    pub fn merge() -> Self {
        Self { merge: true }
    }
}

/// A stored document.
#[derive(Debug, Clone)]
pub struct Document {
    pub collection: String,
    pub id: String,
    pub parent_id: Option<String>,
    pub fields: Map<String, Value>,
    pub created_at: String,
    pub updated_at: String,
}

impl Document {
    /// Deserialize the fields, exposing the document id as `id` when the
    /// fields do not carry one.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, AppError> {
        let mut fields = self.fields.clone();
        fields
            .entry("id")
            .or_insert_with(|| Value::String(self.id.clone()));
        serde_json::from_value(Value::Object(fields)).map_err(|e| {
            AppError::Internal(format!(
                "Corrupt document {}/{}: {}",
                self.collection, self.id, e
            ))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// Notification published after every successful write.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub collection: String,
    pub id: String,
    pub kind: ChangeKind,
    /// Document fields after the write; `None` for removals.
    pub fields: Option<Map<String, Value>>,
}

/// Live feed of changes to one collection. Dropping it unsubscribes.
pub struct Subscription {
    collection: String,
    rx: broadcast::Receiver<ChangeEvent>,
}

impl Subscription {
    /// Next change to the watched collection.
    ///
    /// Returns `Ok(None)` once the store is gone and an error when this
    /// subscriber fell behind and missed events; the feed stays usable after
    /// an error.
    pub async fn next(&mut self) -> Result<Option<ChangeEvent>, AppError> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.collection == self.collection => return Ok(Some(event)),
                Ok(_) => continue,
                Err(RecvError::Closed) => return Ok(None),
                Err(RecvError::Lagged(missed)) => {
                    return Err(AppError::Internal(format!(
                        "Subscription to {} missed {} changes",
                        self.collection, missed
                    )))
                }
            }
        }
    }
}

/// Serialize a value into top-level document fields.
pub fn to_fields<T: Serialize>(value: &T) -> Result<Map<String, Value>, AppError> {
    match serde_json::to_value(value)? {
        Value::Object(fields) => Ok(fields),
        other => Err(AppError::Internal(format!(
            "Expected an object for document fields, got {}",
            other
        ))),
    }
}

enum Bind {
    Text(String),
    Int(i64),
    Float(f64),
}

/// Document store over a SQLite pool.
///
/// Writes are serialized through `write_lock`, so no other writer runs
/// between a merge's read and its rewrite.
#[derive(Clone)]
pub struct DocumentStore {
    pool: SqlitePool,
    changes: broadcast::Sender<ChangeEvent>,
    write_lock: Arc<Mutex<()>>,
}

impl DocumentStore {
    pub fn new(pool: SqlitePool) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            pool,
            changes,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Write time assigned by the store, RFC 3339 UTC with millisecond precision.
    ///
    /// The fixed width keeps lexicographic and chronological order identical.
    pub fn server_timestamp(&self) -> String {
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Get a document, `None` when absent.
    pub async fn get(&self, path: &DocPath) -> Result<Option<Document>, AppError> {
        let row = sqlx::query(
            "SELECT collection, id, parent_id, fields, created_at, updated_at FROM documents WHERE collection = ? AND id = ?",
        )
        .bind(path.collection.path())
        .bind(&path.id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(document_from_row).transpose()
    }

    /// List documents in a scope matching every filter, ordered by path.
    pub async fn list(&self, scope: &Scope, filters: &[Filter]) -> Result<Vec<Document>, AppError> {
        let mut sql = String::from(
            "SELECT collection, id, parent_id, fields, created_at, updated_at FROM documents WHERE ",
        );
        let mut binds = Vec::new();

        match scope {
            Scope::Collection(collection) => {
                sql.push_str("collection = ?");
                binds.push(Bind::Text(collection.path().to_string()));
            }
            Scope::Group(name) => {
                sql.push_str("collection_group = ?");
                binds.push(Bind::Text(name.clone()));
            }
        }

        for filter in filters {
            match filter {
                Filter::Eq { field, value } => {
                    let json_path = field_path(field)?;
                    match value {
                        Value::Null => {
                            sql.push_str(" AND json_extract(fields, ?) IS NULL");
                            binds.push(Bind::Text(json_path));
                        }
                        Value::Bool(b) => {
                            sql.push_str(" AND json_extract(fields, ?) = ?");
                            binds.push(Bind::Text(json_path));
                            binds.push(Bind::Int(i64::from(*b)));
                        }
                        Value::Number(n) => {
                            sql.push_str(" AND json_extract(fields, ?) = ?");
                            binds.push(Bind::Text(json_path));
                            binds.push(match n.as_i64() {
                                Some(i) => Bind::Int(i),
                                None => Bind::Float(n.as_f64().unwrap_or_default()),
                            });
                        }
                        Value::String(s) => {
                            sql.push_str(" AND json_extract(fields, ?) = ?");
                            binds.push(Bind::Text(json_path));
                            binds.push(Bind::Text(s.clone()));
                        }
                        Value::Array(_) | Value::Object(_) => {
                            return Err(AppError::Validation(format!(
                                "Equality filter on {} must compare a scalar",
                                field
                            )))
                        }
                    }
                }
                Filter::Range { field, from, to } => {
                    let json_path = field_path(field)?;
                    if let Some(from) = from {
                        sql.push_str(" AND json_extract(fields, ?) >= ?");
                        binds.push(Bind::Text(json_path.clone()));
                        binds.push(Bind::Text(from.clone()));
                    }
                    if let Some(to) = to {
                        sql.push_str(" AND json_extract(fields, ?) < ?");
                        binds.push(Bind::Text(json_path));
                        binds.push(Bind::Text(to.clone()));
                    }
                }
            }
        }

        sql.push_str(" ORDER BY collection, id");

        let mut query = sqlx::query(&sql);
        for bind in binds {
            query = match bind {
                Bind::Text(s) => query.bind(s),
                Bind::Int(i) => query.bind(i),
                Bind::Float(f) => query.bind(f),
            };
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(document_from_row).collect()
    }

    /// Write a document. With `merge`, fields present here overwrite the
    /// stored ones and all other stored fields are kept.
    pub async fn set(
        &self,
        path: &DocPath,
        fields: Map<String, Value>,
        options: SetOptions,
    ) -> Result<Document, AppError> {
        self.write(path, fields, options.merge, false).await
    }

    /// Merge fields into an existing document; `NotFound` when it is absent.
    pub async fn update(
        &self,
        path: &DocPath,
        fields: Map<String, Value>,
    ) -> Result<Document, AppError> {
        self.write(path, fields, true, true).await
    }

    async fn write(
        &self,
        path: &DocPath,
        fields: Map<String, Value>,
        merge: bool,
        must_exist: bool,
    ) -> Result<Document, AppError> {
        let _guard = self.write_lock.lock().await;
        let now = self.server_timestamp();
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query(
            "SELECT fields, created_at FROM documents WHERE collection = ? AND id = ?",
        )
        .bind(path.collection.path())
        .bind(&path.id)
        .fetch_optional(&mut *tx)
        .await?;

        let (fields, created_at, kind) = match existing {
            Some(row) => {
                let created_at: String = row.get("created_at");
                let fields = if merge {
                    let mut current = parse_fields(row.get("fields"))?;
                    for (key, value) in fields {
                        current.insert(key, value);
                    }
                    current
                } else {
                    fields
                };
                (fields, created_at, ChangeKind::Modified)
            }
            None if must_exist => {
                return Err(AppError::NotFound(format!("Document {} not found", path)));
            }
            None => (fields, now.clone(), ChangeKind::Added),
        };

        let encoded = serde_json::to_string(&fields)?;

        sqlx::query(
            r#"INSERT INTO documents (collection, id, collection_group, parent_id, fields, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(collection, id) DO UPDATE SET fields = excluded.fields, updated_at = excluded.updated_at"#,
        )
        .bind(path.collection.path())
        .bind(&path.id)
        .bind(path.collection.name())
        .bind(&path.collection.parent_id)
        .bind(&encoded)
        .bind(&created_at)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!("Wrote {} ({:?})", path, kind);
        self.publish(path, kind, Some(fields.clone()));

        Ok(Document {
            collection: path.collection.path().to_string(),
            id: path.id.clone(),
            parent_id: path.collection.parent_id.clone(),
            fields,
            created_at,
            updated_at: now,
        })
    }

    /// Delete a document. Returns whether it existed.
    pub async fn delete(&self, path: &DocPath) -> Result<bool, AppError> {
        let _guard = self.write_lock.lock().await;
        let result = sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(path.collection.path())
            .bind(&path.id)
            .execute(&self.pool)
            .await?;

        let existed = result.rows_affected() > 0;
        if existed {
            tracing::debug!("Deleted {}", path);
            self.publish(path, ChangeKind::Removed, None);
        }
        Ok(existed)
    }

    /// Watch one collection for changes.
    pub fn subscribe(&self, collection: &CollectionPath) -> Subscription {
        Subscription {
            collection: collection.path().to_string(),
            rx: self.changes.subscribe(),
        }
    }

    fn publish(&self, path: &DocPath, kind: ChangeKind, fields: Option<Map<String, Value>>) {
        // No receivers is not an error.
        self.changes
            .send(ChangeEvent {
                collection: path.collection.path().to_string(),
                id: path.id.clone(),
                kind,
                fields,
            })
            .ok();
    }
}

fn field_path(field: &str) -> Result<String, AppError> {
    let valid = !field.is_empty() && field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(AppError::Validation(format!(
            "Invalid filter field name: {:?}",
            field
        )));
    }
    Ok(format!("$.{}", field))
}

fn parse_fields(raw: String) -> Result<Map<String, Value>, AppError> {
    match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(_) => Err(AppError::Internal(
            "Stored document is not a JSON object".to_string(),
        )),
        Err(e) => Err(AppError::Internal(format!("Stored document is not valid JSON: {}", e))),
    }
}

fn document_from_row(row: &SqliteRow) -> Result<Document, AppError> {
    Ok(Document {
        collection: row.get("collection"),
        id: row.get("id"),
        parent_id: row.get("parent_id"),
        fields: parse_fields(row.get("fields"))?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
