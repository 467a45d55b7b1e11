//! Advisory feasibility check of an assignment's quotas against the question
//! banks. Selection clamps regardless of what the report says.

use std::sync::Arc;

use serde::Serialize;
use validator::Validate;

use crate::error::SnapshotResult;
use crate::models::{Assignment, Difficulty, DifficultyCounts, PoolStats};
use crate::services::pool_config::{PoolConfigResolver, PoolPlan, TopicAllocation};
use crate::services::question_bank::QuestionBank;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Shortfall {
    /// `None` when the shortfall is across the shared pool.
    pub topic_id: Option<i64>,
    pub difficulty: Difficulty,
    pub requested: u32,
    pub available: u64,
    pub message: String,
}

impl Shortfall {
    fn new(topic_id: Option<i64>, difficulty: Difficulty, requested: u32, available: u64) -> Self {
        Self {
            topic_id,
            difficulty,
            requested,
            available,
            message: format!(
                "Requested {} {} questions but only {} available",
                requested, difficulty, available
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolReport {
    pub assignment_id: i64,
    pub plan: PoolPlan,
    pub topics: Vec<PoolStats>,
    pub shortfalls: Vec<Shortfall>,
    pub feasible: bool,
}

pub struct PoolReporter {
    bank: Arc<dyn QuestionBank>,
    resolver: PoolConfigResolver,
}

impl PoolReporter {
    pub fn new(bank: Arc<dyn QuestionBank>) -> Self {
        Self {
            bank,
            resolver: PoolConfigResolver::new(),
        }
    }

    pub async fn pool_stats(&self, topic_id: i64) -> SnapshotResult<PoolStats> {
        self.bank.pool_stats(topic_id).await
    }

    pub async fn report(&self, assignment: &Assignment) -> SnapshotResult<PoolReport> {
        assignment.validate()?;

        let mut topics = Vec::with_capacity(assignment.topics.len());
        for topic_id in assignment.topic_ids() {
            topics.push(self.bank.pool_stats(topic_id).await?);
        }

        let plan = self.resolver.resolve(assignment);
        let mut shortfalls = Vec::new();
        match &plan {
            PoolPlan::PerTopic { topics: resolved } => {
                for (topic, stats) in resolved.iter().zip(&topics) {
                    if let TopicAllocation::Quota(quota) = topic.allocation {
                        shortfalls.extend(compare(Some(topic.topic_id), &quota, |d| stats.available(d)));
                    }
                }
            }
            PoolPlan::SharedPool { quota, .. } => {
                shortfalls.extend(compare(None, quota, |d| {
                    topics.iter().map(|stats| stats.available(d)).sum()
                }));
            }
        }

        let feasible = shortfalls.is_empty();
        if !feasible {
            tracing::warn!(
                assignment_id = assignment.id,
                shortfalls = shortfalls.len(),
                "Assignment quotas exceed available questions"
            );
        }

        Ok(PoolReport {
            assignment_id: assignment.id,
            plan,
            topics,
            shortfalls,
            feasible,
        })
    }
}

fn compare(
    topic_id: Option<i64>,
    quota: &DifficultyCounts,
    available: impl Fn(Difficulty) -> u64,
) -> Vec<Shortfall> {
    Difficulty::ALL
        .into_iter()
        .filter_map(|difficulty| {
            let requested = quota.get(difficulty);
            let available = available(difficulty);
            (u64::from(requested) > available)
                .then(|| Shortfall::new(topic_id, difficulty, requested, available))
        })
        .collect()
}
