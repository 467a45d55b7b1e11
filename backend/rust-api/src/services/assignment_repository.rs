use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Context;
use async_trait::async_trait;
use mongodb::bson::doc;
use mongodb::Database;
use serde::Deserialize;

use crate::error::SnapshotResult;
use crate::metrics::track_db_operation;
use crate::models::{Assignment, AssignmentTopic, DifficultyCounts};

#[async_trait]
pub trait AssignmentRepository: Send + Sync {
    async fn get(&self, assignment_id: i64) -> SnapshotResult<Option<Assignment>>;
}

const ASSIGNMENTS: &str = "assignments";

#[derive(Debug, Deserialize)]
struct AssignmentDocument {
    #[serde(rename = "_id")]
    id: i64,
    #[serde(default)]
    topics: Vec<AssignmentTopic>,
    #[serde(default)]
    assignment_level: DifficultyCounts,
    #[serde(default)]
    use_question_pool: bool,
    #[serde(default)]
    randomize_questions: bool,
    #[serde(default = "default_variant_count")]
    pdf_variant_count: u32,
}

fn default_variant_count() -> u32 {
    1
}

impl From<AssignmentDocument> for Assignment {
    fn from(doc: AssignmentDocument) -> Self {
        Assignment {
            id: doc.id,
            topics: doc.topics,
            assignment_level: doc.assignment_level,
            use_question_pool: doc.use_question_pool,
            randomize_questions: doc.randomize_questions,
            pdf_variant_count: doc.pdf_variant_count,
        }
    }
}

pub struct MongoAssignmentRepository {
    mongo: Database,
}

impl MongoAssignmentRepository {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }
}

#[async_trait]
impl AssignmentRepository for MongoAssignmentRepository {
    async fn get(&self, assignment_id: i64) -> SnapshotResult<Option<Assignment>> {
        let collection = self.mongo.collection::<AssignmentDocument>(ASSIGNMENTS);
        let found = track_db_operation("find_one", ASSIGNMENTS, async {
            collection
                .find_one(doc! { "_id": assignment_id })
                .await
                .context("Failed to query assignment")
        })
        .await?;

        Ok(found.map(Assignment::from))
    }
}

#[derive(Default)]
pub struct InMemoryAssignmentRepository {
    assignments: Mutex<HashMap<i64, Assignment>>,
}

impl InMemoryAssignmentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, assignment: Assignment) {
        self.assignments
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(assignment.id, assignment);
    }
}

#[async_trait]
impl AssignmentRepository for InMemoryAssignmentRepository {
    async fn get(&self, assignment_id: i64) -> SnapshotResult<Option<Assignment>> {
        Ok(self
            .assignments
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&assignment_id)
            .cloned())
    }
}
