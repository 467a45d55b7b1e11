use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Display/file-naming identifier of one printed exam instance.
pub fn instance_id(assignment_id: i64, variant_number: u32) -> String {
    format!("EXAM-{:06}-V{}", assignment_id, variant_number)
}

/// Questions selected from one topic, in presentation order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopicGroup {
    pub topic_id: i64,
    pub topic_title: String,
    pub question_ids: Vec<i64>,
}

impl TopicGroup {
    fn sorted_ids(&self) -> Vec<i64> {
        let mut ids = self.question_ids.clone();
        ids.sort_unstable();
        ids
    }
}

/// Serialized as the bare ordered array of topic groups.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Snapshot {
    pub topics: Vec<TopicGroup>,
}

impl Snapshot {
    pub fn new(topics: Vec<TopicGroup>) -> Self {
        Self { topics }
    }

    pub fn is_empty(&self) -> bool {
        self.total_questions() == 0
    }

    pub fn total_questions(&self) -> usize {
        self.topics.iter().map(|group| group.question_ids.len()).sum()
    }

    /// True when every topic group holds the same multiset of question ids as
    /// `other`, ignoring order within a group.
    pub fn same_content_as(&self, other: &Snapshot) -> bool {
        if self.topics.len() != other.topics.len() {
            return false;
        }

        let theirs: HashMap<i64, Vec<i64>> = other
            .topics
            .iter()
            .map(|group| (group.topic_id, group.sorted_ids()))
            .collect();

        self.topics
            .iter()
            .all(|group| theirs.get(&group.topic_id) == Some(&group.sorted_ids()))
    }
}

/// Export provenance. Updated on every re-export, never touches content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportMetadata {
    pub exported_by: Option<i64>,
    pub exported_at: DateTime<Utc>,
    pub file_path: Option<String>,
    pub notes: Option<String>,
}

impl ExportMetadata {
    pub fn now() -> Self {
        Self {
            exported_by: None,
            exported_at: Utc::now(),
            file_path: None,
            notes: None,
        }
    }

    pub fn by(exported_by: Option<i64>) -> Self {
        Self {
            exported_by,
            ..Self::now()
        }
    }

    pub fn with_file_path(mut self, file_path: Option<String>) -> Self {
        self.file_path = file_path;
        self
    }

    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }
}

/// One persisted row, unique per `(assignment_id, variant_number)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotRecord {
    pub assignment_id: i64,
    pub variant_number: u32,
    pub question_snapshot: Snapshot,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub metadata: ExportMetadata,
}

impl SnapshotRecord {
    pub fn instance_id(&self) -> String {
        instance_id(self.assignment_id, self.variant_number)
    }
}

#[derive(Debug, Serialize)]
pub struct SnapshotResponse {
    pub instance_id: String,
    pub assignment_id: i64,
    pub variant_number: u32,
    pub topics: Vec<TopicGroup>,
    pub total_questions: usize,
    pub created_at: DateTime<Utc>,
    pub exported_at: DateTime<Utc>,
    pub exported_by: Option<i64>,
    pub file_path: Option<String>,
    pub notes: Option<String>,
}

impl From<SnapshotRecord> for SnapshotResponse {
    fn from(record: SnapshotRecord) -> Self {
        Self {
            instance_id: record.instance_id(),
            assignment_id: record.assignment_id,
            variant_number: record.variant_number,
            total_questions: record.question_snapshot.total_questions(),
            topics: record.question_snapshot.topics,
            created_at: record.created_at,
            exported_at: record.metadata.exported_at,
            exported_by: record.metadata.exported_by,
            file_path: record.metadata.file_path,
            notes: record.metadata.notes,
        }
    }
}
