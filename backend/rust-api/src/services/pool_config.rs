//! Resolves how many questions of each difficulty every topic of an
//! assignment contributes.
//!
//! Resolution runs once per assignment. Deciding per topic in isolation is
//! what used to apply the assignment-level quota N times across N topics.

use serde::Serialize;

use crate::models::{Assignment, DifficultyCounts};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TopicAllocation {
    /// Pooling disabled: every active question of the topic.
    EntireBank,
    Quota(DifficultyCounts),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaSource {
    PoolDisabled,
    Topic,
    /// Topic had no quota of its own; the assignment-level quota applies to it alone.
    AssignmentFallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedTopic {
    pub topic_id: i64,
    pub allocation: TopicAllocation,
    pub source: QuotaSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PoolPlan {
    PerTopic { topics: Vec<ResolvedTopic> },
    /// One quota drawn once from the union of all topics.
    SharedPool {
        topic_ids: Vec<i64>,
        quota: DifficultyCounts,
    },
}

impl PoolPlan {
    pub fn is_shared(&self) -> bool {
        matches!(self, PoolPlan::SharedPool { .. })
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PoolConfigResolver;

impl PoolConfigResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn resolve(&self, assignment: &Assignment) -> PoolPlan {
        let topics = assignment.ordered_topics();

        if !assignment.use_question_pool {
            return PoolPlan::PerTopic {
                topics: topics
                    .into_iter()
                    .map(|topic| ResolvedTopic {
                        topic_id: topic.topic_id,
                        allocation: TopicAllocation::EntireBank,
                        source: QuotaSource::PoolDisabled,
                    })
                    .collect(),
            };
        }

        let fallback = assignment.assignment_level;
        let assignment_total = fallback.total();

        if topics.len() > 1
            && assignment_total > 0
            && topics.iter().all(|topic| topic.quota().is_zero())
        {
            tracing::info!(
                assignment_id = assignment.id,
                topics = topics.len(),
                easy = fallback.easy_count,
                medium = fallback.medium_count,
                hard = fallback.hard_count,
                "Multi-topic assignment without per-topic counts; using assignment-level distribution once across all topics"
            );
            return PoolPlan::SharedPool {
                topic_ids: topics.iter().map(|topic| topic.topic_id).collect(),
                quota: fallback,
            };
        }

        let resolved = topics
            .into_iter()
            .map(|topic| {
                let own = topic.quota();
                let (quota, source) = if own.is_zero() && assignment_total > 0 {
                    tracing::debug!(
                        assignment_id = assignment.id,
                        topic_id = topic.topic_id,
                        "Topic has no quota of its own; applying assignment-level quota"
                    );
                    (fallback, QuotaSource::AssignmentFallback)
                } else {
                    (own, QuotaSource::Topic)
                };
                ResolvedTopic {
                    topic_id: topic.topic_id,
                    allocation: TopicAllocation::Quota(quota),
                    source,
                }
            })
            .collect();

        PoolPlan::PerTopic { topics: resolved }
    }
}
