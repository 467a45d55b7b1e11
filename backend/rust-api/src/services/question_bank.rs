//! Read-only access to topics and their active questions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use anyhow::Context;
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::doc;
use mongodb::Database;
use serde::Deserialize;

use crate::error::SnapshotResult;
use crate::metrics::track_db_operation;
use crate::models::{Difficulty, PoolStats, Question, Topic};

/// Query surface the selection engine needs from the question banks.
///
/// Every listing returns active questions only, in storage order.
#[async_trait]
pub trait QuestionBank: Send + Sync {
    async fn topic(&self, topic_id: i64) -> SnapshotResult<Option<Topic>>;

    /// Every active question of a topic, all difficulties.
    async fn list_topic_questions(&self, topic_id: i64) -> SnapshotResult<Vec<Question>>;

    async fn list_active_questions(
        &self,
        topic_id: i64,
        difficulty: Difficulty,
    ) -> SnapshotResult<Vec<Question>>;

    /// Union of active questions of `difficulty` across `topic_ids`.
    async fn list_active_questions_in(
        &self,
        topic_ids: &[i64],
        difficulty: Difficulty,
    ) -> SnapshotResult<Vec<Question>>;

    async fn count_active_questions(
        &self,
        topic_ids: &[i64],
        difficulty: Difficulty,
    ) -> SnapshotResult<u64>;

    async fn pool_stats(&self, topic_id: i64) -> SnapshotResult<PoolStats> {
        let topic_ids = [topic_id];
        let mut stats = PoolStats {
            topic_id,
            ..PoolStats::default()
        };
        for difficulty in Difficulty::ALL {
            let count = self.count_active_questions(&topic_ids, difficulty).await?;
            match difficulty {
                Difficulty::Easy => stats.easy = count,
                Difficulty::Medium => stats.medium = count,
                Difficulty::Hard => stats.hard = count,
            }
        }
        stats.total = stats.easy + stats.medium + stats.hard;
        Ok(stats)
    }
}

const QUESTIONS: &str = "questions";
const TOPICS: &str = "topics";

#[derive(Debug, Deserialize)]
struct TopicDocument {
    #[serde(rename = "_id")]
    id: i64,
    title: String,
}

#[derive(Debug, Deserialize)]
struct QuestionDocument {
    #[serde(rename = "_id")]
    id: i64,
    topic_id: i64,
    difficulty: Difficulty,
    #[serde(default = "default_active")]
    is_active: bool,
    #[serde(default = "default_points")]
    points: i32,
}

fn default_active() -> bool {
    true
}

fn default_points() -> i32 {
    1
}

impl From<QuestionDocument> for Question {
    fn from(doc: QuestionDocument) -> Self {
        Question {
            id: doc.id,
            topic_id: doc.topic_id,
            difficulty: doc.difficulty,
            is_active: doc.is_active,
            points: doc.points,
        }
    }
}

pub struct MongoQuestionBank {
    mongo: Database,
}

impl MongoQuestionBank {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    async fn find_questions(&self, filter: mongodb::bson::Document) -> SnapshotResult<Vec<Question>> {
        let collection = self.mongo.collection::<QuestionDocument>(QUESTIONS);
        let docs: Vec<QuestionDocument> = track_db_operation("find", QUESTIONS, async {
            collection
                .find(filter)
                .sort(doc! { "order_index": 1, "_id": 1 })
                .await
                .context("Failed to query questions")?
                .try_collect()
                .await
                .context("Failed to read questions cursor")
        })
        .await?;

        Ok(docs.into_iter().map(Question::from).collect())
    }
}

#[async_trait]
impl QuestionBank for MongoQuestionBank {
    async fn topic(&self, topic_id: i64) -> SnapshotResult<Option<Topic>> {
        let collection = self.mongo.collection::<TopicDocument>(TOPICS);
        let found = track_db_operation("find_one", TOPICS, async {
            collection
                .find_one(doc! { "_id": topic_id })
                .await
                .context("Failed to query topic")
        })
        .await?;

        Ok(found.map(|doc| Topic {
            id: doc.id,
            title: doc.title,
        }))
    }

    async fn list_topic_questions(&self, topic_id: i64) -> SnapshotResult<Vec<Question>> {
        self.find_questions(doc! { "topic_id": topic_id, "is_active": true })
            .await
    }

    async fn list_active_questions(
        &self,
        topic_id: i64,
        difficulty: Difficulty,
    ) -> SnapshotResult<Vec<Question>> {
        self.find_questions(doc! {
            "topic_id": topic_id,
            "difficulty": difficulty.as_str(),
            "is_active": true,
        })
        .await
    }

    async fn list_active_questions_in(
        &self,
        topic_ids: &[i64],
        difficulty: Difficulty,
    ) -> SnapshotResult<Vec<Question>> {
        if topic_ids.is_empty() {
            return Ok(Vec::new());
        }

        self.find_questions(doc! {
            "topic_id": { "$in": topic_ids },
            "difficulty": difficulty.as_str(),
            "is_active": true,
        })
        .await
    }

    async fn count_active_questions(
        &self,
        topic_ids: &[i64],
        difficulty: Difficulty,
    ) -> SnapshotResult<u64> {
        if topic_ids.is_empty() {
            return Ok(0);
        }

        let collection = self.mongo.collection::<mongodb::bson::Document>(QUESTIONS);
        let count = track_db_operation("count", QUESTIONS, async {
            collection
                .count_documents(doc! {
                    "topic_id": { "$in": topic_ids },
                    "difficulty": difficulty.as_str(),
                    "is_active": true,
                })
                .await
                .context("Failed to count questions")
        })
        .await?;

        Ok(count)
    }
}

/// Question bank held in memory; questions keep insertion order.
#[derive(Default)]
pub struct InMemoryQuestionBank {
    topics: Mutex<HashMap<i64, Topic>>,
    questions: Mutex<Vec<Question>>,
    queries: AtomicUsize,
}

impl InMemoryQuestionBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_topic(&self, topic_id: i64, title: &str) {
        lock(&self.topics).insert(
            topic_id,
            Topic {
                id: topic_id,
                title: title.to_string(),
            },
        );
    }

    pub fn add_question(&self, id: i64, topic_id: i64, difficulty: Difficulty) {
        self.insert(Question {
            id,
            topic_id,
            difficulty,
            is_active: true,
            points: 1,
        });
    }

    /// Adds `ids` as active questions of one topic and difficulty.
    pub fn add_questions(&self, topic_id: i64, difficulty: Difficulty, ids: impl IntoIterator<Item = i64>) {
        for id in ids {
            self.add_question(id, topic_id, difficulty);
        }
    }

    pub fn insert(&self, question: Question) {
        lock(&self.questions).push(question);
    }

    pub fn set_active(&self, question_id: i64, is_active: bool) {
        for question in lock(&self.questions).iter_mut() {
            if question.id == question_id {
                question.is_active = is_active;
            }
        }
    }

    /// Number of question listings served so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::Relaxed)
    }

    fn select(&self, predicate: impl Fn(&Question) -> bool) -> Vec<Question> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        lock(&self.questions)
            .iter()
            .filter(|question| question.is_active && predicate(question))
            .cloned()
            .collect()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl QuestionBank for InMemoryQuestionBank {
    async fn topic(&self, topic_id: i64) -> SnapshotResult<Option<Topic>> {
        Ok(lock(&self.topics).get(&topic_id).cloned())
    }

    async fn list_topic_questions(&self, topic_id: i64) -> SnapshotResult<Vec<Question>> {
        Ok(self.select(|q| q.topic_id == topic_id))
    }

    async fn list_active_questions(
        &self,
        topic_id: i64,
        difficulty: Difficulty,
    ) -> SnapshotResult<Vec<Question>> {
        Ok(self.select(|q| q.topic_id == topic_id && q.difficulty == difficulty))
    }

    async fn list_active_questions_in(
        &self,
        topic_ids: &[i64],
        difficulty: Difficulty,
    ) -> SnapshotResult<Vec<Question>> {
        Ok(self.select(|q| topic_ids.contains(&q.topic_id) && q.difficulty == difficulty))
    }

    async fn count_active_questions(
        &self,
        topic_ids: &[i64],
        difficulty: Difficulty,
    ) -> SnapshotResult<u64> {
        let count = lock(&self.questions)
            .iter()
            .filter(|q| q.is_active && q.difficulty == difficulty && topic_ids.contains(&q.topic_id))
            .count();
        Ok(count as u64)
    }
}
