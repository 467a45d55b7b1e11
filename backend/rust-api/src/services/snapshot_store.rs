//! Persistence of selected question groups per `(assignment, variant)`.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::{doc, to_bson, Bson, DateTime as BsonDateTime, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::IndexOptions;
use mongodb::{Collection, Database, IndexModel};
use serde::{Deserialize, Serialize};

use crate::error::SnapshotResult;
use crate::metrics::{track_db_operation, SNAPSHOT_STORE_CONFLICTS_TOTAL};
use crate::models::{ExportMetadata, Snapshot, SnapshotRecord};
use crate::utils::time::{bson_to_chrono, chrono_to_bson};

/// Rows are unique per `(assignment_id, variant_number)`.
///
/// `put` without `hard_regenerate` is first-insert-wins for content: when a
/// row already exists only its export metadata changes. `put` always returns
/// the row as committed, so a caller that lost a creation race sees the
/// winner's questions.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn get(
        &self,
        assignment_id: i64,
        variant_number: u32,
    ) -> SnapshotResult<Option<SnapshotRecord>>;

    async fn put(
        &self,
        assignment_id: i64,
        variant_number: u32,
        snapshot: &Snapshot,
        metadata: &ExportMetadata,
        hard_regenerate: bool,
    ) -> SnapshotResult<SnapshotRecord>;

    async fn list(&self, assignment_id: i64) -> SnapshotResult<Vec<SnapshotRecord>>;

    /// Drops every variant of the assignment. Returns the number of rows removed.
    async fn invalidate(&self, assignment_id: i64) -> SnapshotResult<u64>;

    async fn ping(&self) -> SnapshotResult<()> {
        Ok(())
    }
}

const EXAM_SNAPSHOTS: &str = "exam_snapshots";

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotDocument {
    assignment_id: i64,
    variant_number: i64,
    question_snapshot: Snapshot,
    created_at: BsonDateTime,
    exported_at: BsonDateTime,
    #[serde(default)]
    exported_by: Option<i64>,
    #[serde(default)]
    file_path: Option<String>,
    #[serde(default)]
    notes: Option<String>,
}

impl TryFrom<SnapshotDocument> for SnapshotRecord {
    type Error = anyhow::Error;

    fn try_from(doc: SnapshotDocument) -> Result<Self, Self::Error> {
        let variant_number = u32::try_from(doc.variant_number)
            .map_err(|_| anyhow!("Stored variant number {} is out of range", doc.variant_number))?;

        Ok(SnapshotRecord {
            assignment_id: doc.assignment_id,
            variant_number,
            question_snapshot: doc.question_snapshot,
            created_at: bson_to_chrono(doc.created_at),
            metadata: ExportMetadata {
                exported_by: doc.exported_by,
                exported_at: bson_to_chrono(doc.exported_at),
                file_path: doc.file_path,
                notes: doc.notes,
            },
        })
    }
}

fn key_filter(assignment_id: i64, variant_number: u32) -> Document {
    doc! {
        "assignment_id": assignment_id,
        "variant_number": variant_number as i64,
    }
}

fn metadata_fields(metadata: &ExportMetadata) -> Document {
    let mut fields = doc! {
        "exported_at": chrono_to_bson(metadata.exported_at),
        "exported_by": metadata.exported_by.map(Bson::Int64).unwrap_or(Bson::Null),
        "file_path": metadata.file_path.clone().map(Bson::String).unwrap_or(Bson::Null),
    };
    if let Some(notes) = &metadata.notes {
        fields.insert("notes", notes.clone());
    }
    fields
}

/// E11000: a concurrent upsert inserted the same key first.
fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match *err.kind {
        ErrorKind::Write(WriteFailure::WriteError(ref we)) => we.code == 11000,
        ErrorKind::Command(ref ce) => ce.code == 11000,
        _ => false,
    }
}

pub struct MongoSnapshotStore {
    mongo: Database,
}

impl MongoSnapshotStore {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    fn collection(&self) -> Collection<SnapshotDocument> {
        self.mongo.collection::<SnapshotDocument>(EXAM_SNAPSHOTS)
    }

    /// Creates the unique `(assignment_id, variant_number)` index the upsert
    /// contract relies on.
    pub async fn ensure_indexes(&self) -> anyhow::Result<()> {
        let index = IndexModel::builder()
            .keys(doc! { "assignment_id": 1, "variant_number": 1 })
            .options(
                IndexOptions::builder()
                    .unique(true)
                    .name("assignment_variant_unique".to_string())
                    .build(),
            )
            .build();

        self.collection()
            .create_index(index)
            .await
            .context("Failed to create exam_snapshots unique index")?;

        tracing::info!("exam_snapshots unique index ensured");
        Ok(())
    }

    async fn update(&self, filter: Document, update: Document, upsert: bool) -> mongodb::error::Result<()> {
        track_db_operation("update", EXAM_SNAPSHOTS, async {
            self.collection()
                .update_one(filter, update)
                .upsert(upsert)
                .await
                .map(|_| ())
        })
        .await
    }
}

#[async_trait]
impl SnapshotStore for MongoSnapshotStore {
    async fn get(
        &self,
        assignment_id: i64,
        variant_number: u32,
    ) -> SnapshotResult<Option<SnapshotRecord>> {
        let collection = self.collection();
        let found = track_db_operation("find_one", EXAM_SNAPSHOTS, async {
            collection
                .find_one(key_filter(assignment_id, variant_number))
                .await
                .context("Failed to query exam snapshot")
        })
        .await?;

        Ok(found.map(SnapshotRecord::try_from).transpose()?)
    }

    async fn put(
        &self,
        assignment_id: i64,
        variant_number: u32,
        snapshot: &Snapshot,
        metadata: &ExportMetadata,
        hard_regenerate: bool,
    ) -> SnapshotResult<SnapshotRecord> {
        let filter = key_filter(assignment_id, variant_number);
        let content = to_bson(snapshot).context("Failed to serialize question snapshot")?;
        let now = chrono_to_bson(Utc::now());

        let mut set_fields = metadata_fields(metadata);
        if hard_regenerate {
            set_fields.insert("question_snapshot", content.clone());
            set_fields.insert("created_at", now);
        }
        let update = if hard_regenerate {
            doc! { "$set": set_fields.clone() }
        } else {
            doc! {
                "$set": set_fields.clone(),
                "$setOnInsert": {
                    "question_snapshot": content,
                    "created_at": now,
                },
            }
        };

        match self.update(filter.clone(), update, true).await {
            Ok(()) => {}
            Err(err) if is_duplicate_key(&err) => {
                // Lost the insert race; the committed row keeps its content.
                SNAPSHOT_STORE_CONFLICTS_TOTAL.inc();
                tracing::warn!(
                    assignment_id,
                    variant_number,
                    "Concurrent snapshot insert detected, keeping committed row"
                );
                self.update(filter, doc! { "$set": set_fields }, false)
                    .await
                    .context("Failed to update exam snapshot after insert conflict")?;
            }
            Err(err) => {
                return Err(anyhow::Error::new(err)
                    .context("Failed to upsert exam snapshot")
                    .into());
            }
        }

        self.get(assignment_id, variant_number)
            .await?
            .ok_or_else(|| {
                anyhow!(
                    "Snapshot for assignment {} variant {} missing after upsert",
                    assignment_id,
                    variant_number
                )
                .into()
            })
    }

    async fn list(&self, assignment_id: i64) -> SnapshotResult<Vec<SnapshotRecord>> {
        let collection = self.collection();
        let docs: Vec<SnapshotDocument> = track_db_operation("find", EXAM_SNAPSHOTS, async {
            collection
                .find(doc! { "assignment_id": assignment_id })
                .sort(doc! { "variant_number": 1 })
                .await
                .context("Failed to query exam snapshots")?
                .try_collect()
                .await
                .context("Failed to read exam snapshots cursor")
        })
        .await?;

        let records = docs
            .into_iter()
            .map(SnapshotRecord::try_from)
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(records)
    }

    async fn invalidate(&self, assignment_id: i64) -> SnapshotResult<u64> {
        let collection = self.collection();
        let result = track_db_operation("delete", EXAM_SNAPSHOTS, async {
            collection
                .delete_many(doc! { "assignment_id": assignment_id })
                .await
                .context("Failed to delete exam snapshots")
        })
        .await?;

        tracing::info!(
            assignment_id,
            deleted = result.deleted_count,
            "Exam snapshots invalidated"
        );
        Ok(result.deleted_count)
    }

    async fn ping(&self) -> SnapshotResult<()> {
        tokio::time::timeout(
            std::time::Duration::from_secs(1),
            self.mongo.run_command(doc! { "ping": 1 }),
        )
        .await
        .map_err(|_| anyhow!("MongoDB timeout after 1s"))?
        .context("MongoDB ping failed")?;
        Ok(())
    }
}

/// Mutex-guarded map honoring the same contract as the Mongo store.
#[derive(Default)]
pub struct InMemorySnapshotStore {
    rows: Mutex<BTreeMap<(i64, u32), SnapshotRecord>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows().is_empty()
    }

    fn rows(&self) -> MutexGuard<'_, BTreeMap<(i64, u32), SnapshotRecord>> {
        self.rows.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn get(
        &self,
        assignment_id: i64,
        variant_number: u32,
    ) -> SnapshotResult<Option<SnapshotRecord>> {
        Ok(self.rows().get(&(assignment_id, variant_number)).cloned())
    }

    async fn put(
        &self,
        assignment_id: i64,
        variant_number: u32,
        snapshot: &Snapshot,
        metadata: &ExportMetadata,
        hard_regenerate: bool,
    ) -> SnapshotResult<SnapshotRecord> {
        let mut rows = self.rows();
        let row = rows
            .entry((assignment_id, variant_number))
            .and_modify(|existing| {
                let notes = metadata.notes.clone().or_else(|| existing.metadata.notes.take());
                existing.metadata = ExportMetadata {
                    notes,
                    ..metadata.clone()
                };
                if hard_regenerate {
                    existing.question_snapshot = snapshot.clone();
                    existing.created_at = Utc::now();
                }
            })
            .or_insert_with(|| SnapshotRecord {
                assignment_id,
                variant_number,
                question_snapshot: snapshot.clone(),
                created_at: Utc::now(),
                metadata: metadata.clone(),
            });
        Ok(row.clone())
    }

    async fn list(&self, assignment_id: i64) -> SnapshotResult<Vec<SnapshotRecord>> {
        Ok(self
            .rows()
            .range((assignment_id, 0)..=(assignment_id, u32::MAX))
            .map(|(_, record)| record.clone())
            .collect())
    }

    async fn invalidate(&self, assignment_id: i64) -> SnapshotResult<u64> {
        let mut rows = self.rows();
        let before = rows.len();
        rows.retain(|(id, _), _| *id != assignment_id);
        Ok((before - rows.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TopicGroup;
    use chrono::Duration;

    fn snapshot(ids: &[i64]) -> Snapshot {
        Snapshot::new(vec![TopicGroup {
            topic_id: 1,
            topic_title: "Networking".to_string(),
            question_ids: ids.to_vec(),
        }])
    }

    #[tokio::test]
    async fn put_on_existing_row_updates_metadata_only() {
        let store = InMemorySnapshotStore::new();
        let first = ExportMetadata::by(Some(10)).with_notes(Some("first print".to_string()));
        store.put(1, 1, &snapshot(&[1, 2, 3]), &first, false).await.unwrap();

        let reprint = ExportMetadata {
            exported_by: Some(11),
            exported_at: first.exported_at + Duration::minutes(5),
            file_path: Some("/exports/EXAM-000001-V1.pdf".to_string()),
            notes: None,
        };
        let committed = store
            .put(1, 1, &snapshot(&[7, 8, 9]), &reprint, false)
            .await
            .unwrap();

        assert_eq!(committed.question_snapshot, snapshot(&[1, 2, 3]));
        assert_eq!(committed.metadata.exported_by, Some(11));
        assert_eq!(committed.metadata.exported_at, reprint.exported_at);
        assert_eq!(committed.metadata.file_path, reprint.file_path);
        assert_eq!(committed.metadata.notes.as_deref(), Some("first print"));
    }

    #[tokio::test]
    async fn hard_regenerate_replaces_content() {
        let store = InMemorySnapshotStore::new();
        store
            .put(1, 1, &snapshot(&[1, 2]), &ExportMetadata::now(), false)
            .await
            .unwrap();
        let committed = store
            .put(1, 1, &snapshot(&[3, 4]), &ExportMetadata::now(), true)
            .await
            .unwrap();

        assert_eq!(committed.question_snapshot, snapshot(&[3, 4]));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn list_and_invalidate_are_scoped_to_one_assignment() {
        let store = InMemorySnapshotStore::new();
        for (assignment_id, variant) in [(1, 2), (1, 1), (2, 1)] {
            store
                .put(assignment_id, variant, &snapshot(&[1]), &ExportMetadata::now(), false)
                .await
                .unwrap();
        }

        let variants: Vec<u32> = store
            .list(1)
            .await
            .unwrap()
            .iter()
            .map(|r| r.variant_number)
            .collect();
        assert_eq!(variants, vec![1, 2]);

        assert_eq!(store.invalidate(1).await.unwrap(), 2);
        assert!(store.get(1, 1).await.unwrap().is_none());
        assert!(store.get(2, 1).await.unwrap().is_some());
    }

    #[test]
    fn metadata_fields_omit_notes_when_absent() {
        let fields = metadata_fields(&ExportMetadata::by(Some(3)));
        assert!(!fields.contains_key("notes"));
        assert_eq!(fields.get_i64("exported_by").unwrap(), 3);
        assert_eq!(fields.get("file_path"), Some(&Bson::Null));
    }

    fn stored(variant_number: i64) -> SnapshotDocument {
        let now = chrono_to_bson(Utc::now());
        SnapshotDocument {
            assignment_id: 1,
            variant_number,
            question_snapshot: snapshot(&[5]),
            created_at: now,
            exported_at: now,
            exported_by: None,
            file_path: None,
            notes: None,
        }
    }

    #[test]
    fn stored_document_converts_to_record() {
        let record = SnapshotRecord::try_from(stored(2)).unwrap();
        assert_eq!(record.instance_id(), "EXAM-000001-V2");
        assert!(SnapshotRecord::try_from(stored(-1)).is_err());
    }
}
