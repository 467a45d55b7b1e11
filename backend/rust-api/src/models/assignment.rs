use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use validator::{Validate, ValidationError};

use super::question::Difficulty;

/// Requested question count per difficulty.
///
/// Unknown keys are rejected on deserialization: a misspelled `easy_cuont`
/// must fail loudly instead of becoming a silent zero quota.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DifficultyCounts {
    #[serde(default)]
    pub easy_count: u32,
    #[serde(default)]
    pub medium_count: u32,
    #[serde(default)]
    pub hard_count: u32,
}

impl DifficultyCounts {
    pub fn new(easy_count: u32, medium_count: u32, hard_count: u32) -> Self {
        Self {
            easy_count,
            medium_count,
            hard_count,
        }
    }

    pub fn get(&self, difficulty: Difficulty) -> u32 {
        match difficulty {
            Difficulty::Easy => self.easy_count,
            Difficulty::Medium => self.medium_count,
            Difficulty::Hard => self.hard_count,
        }
    }

    pub fn total(&self) -> u32 {
        self.easy_count
            .saturating_add(self.medium_count)
            .saturating_add(self.hard_count)
    }

    pub fn is_zero(&self) -> bool {
        self.total() == 0
    }
}

/// A topic (question bank) referenced by an assignment, with its own quota.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AssignmentTopic {
    pub topic_id: i64,
    #[serde(default)]
    pub order_index: i32,
    #[serde(default)]
    pub easy_count: u32,
    #[serde(default)]
    pub medium_count: u32,
    #[serde(default)]
    pub hard_count: u32,
}

impl AssignmentTopic {
    pub fn new(topic_id: i64, order_index: i32, quota: DifficultyCounts) -> Self {
        Self {
            topic_id,
            order_index,
            easy_count: quota.easy_count,
            medium_count: quota.medium_count,
            hard_count: quota.hard_count,
        }
    }

    pub fn quota(&self) -> DifficultyCounts {
        DifficultyCounts::new(self.easy_count, self.medium_count, self.hard_count)
    }
}

/// Assignment descriptor as authored by the administration UI.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Assignment {
    pub id: i64,

    #[validate(custom(function = "validate_unique_topics"))]
    #[serde(default)]
    pub topics: Vec<AssignmentTopic>,

    #[serde(default)]
    pub assignment_level: DifficultyCounts,

    #[serde(default)]
    pub use_question_pool: bool,

    #[serde(default)]
    pub randomize_questions: bool,

    #[validate(range(min = 1, message = "pdf_variant_count must be at least 1"))]
    #[serde(default = "default_variant_count")]
    pub pdf_variant_count: u32,
}

fn default_variant_count() -> u32 {
    1
}

fn validate_unique_topics(topics: &[AssignmentTopic]) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for topic in topics {
        if !seen.insert(topic.topic_id) {
            let mut error = ValidationError::new("duplicate_topic");
            error.message = Some(format!("Topic {} is referenced more than once", topic.topic_id).into());
            return Err(error);
        }
    }
    Ok(())
}

impl Assignment {
    /// Topic references in presentation order (`order_index`, stable for ties).
    pub fn ordered_topics(&self) -> Vec<&AssignmentTopic> {
        let mut topics: Vec<&AssignmentTopic> = self.topics.iter().collect();
        topics.sort_by_key(|topic| topic.order_index);
        topics
    }

    pub fn topic_ids(&self) -> Vec<i64> {
        self.ordered_topics()
            .into_iter()
            .map(|topic| topic.topic_id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assignment(topics: Vec<AssignmentTopic>, pdf_variant_count: u32) -> Assignment {
        Assignment {
            id: 1,
            topics,
            assignment_level: DifficultyCounts::default(),
            use_question_pool: true,
            randomize_questions: false,
            pdf_variant_count,
        }
    }

    #[test]
    fn counts_reject_misspelled_keys() {
        let result = serde_json::from_value::<DifficultyCounts>(json!({ "easy_cuont": 3 }));
        assert!(result.is_err());
    }

    #[test]
    fn descriptor_deserializes_topic_quota() {
        let parsed: Assignment = serde_json::from_value(json!({
            "id": 7,
            "topics": [
                { "topic_id": 3, "order_index": 1, "easy_count": 2, "medium_count": 1, "hard_count": 0 }
            ],
            "assignment_level": { "easy_count": 4 },
            "use_question_pool": true,
            "randomize_questions": false,
            "pdf_variant_count": 2
        }))
        .unwrap();

        assert_eq!(parsed.topics[0].quota(), DifficultyCounts::new(2, 1, 0));
        assert_eq!(parsed.assignment_level.total(), 4);
        assert_eq!(parsed.pdf_variant_count, 2);
    }

    #[test]
    fn topic_reference_rejects_misspelled_quota_key() {
        let result = serde_json::from_value::<AssignmentTopic>(json!({
            "topic_id": 3,
            "eazy_count": 2
        }));
        assert!(result.is_err());
    }

    #[test]
    fn ordered_topics_follow_order_index() {
        let a = assignment(
            vec![
                AssignmentTopic::new(30, 2, DifficultyCounts::default()),
                AssignmentTopic::new(10, 0, DifficultyCounts::default()),
                AssignmentTopic::new(20, 1, DifficultyCounts::default()),
            ],
            1,
        );
        assert_eq!(a.topic_ids(), vec![10, 20, 30]);
    }

    #[test]
    fn validation_rejects_zero_variants_and_duplicate_topics() {
        assert!(assignment(vec![], 0).validate().is_err());

        let duplicated = assignment(
            vec![
                AssignmentTopic::new(5, 0, DifficultyCounts::default()),
                AssignmentTopic::new(5, 1, DifficultyCounts::default()),
            ],
            1,
        );
        assert!(duplicated.validate().is_err());

        assert!(assignment(vec![], 3).validate().is_ok());
    }
}
