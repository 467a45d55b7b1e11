use crate::models::{Snapshot, TopicGroup};
use crate::services::sampler::RandomSource;

/// Builds variants 2..N from the master snapshot (variant 1).
///
/// A variant never changes which questions a topic holds, only their order.
#[derive(Clone, Default)]
pub struct VariantGenerator {
    random: RandomSource,
}

impl VariantGenerator {
    pub fn new(random: RandomSource) -> Self {
        Self { random }
    }

    pub fn derive(&self, master: &Snapshot, variant_number: u32, randomize: bool) -> Snapshot {
        let topics = master
            .topics
            .iter()
            .map(|group| {
                let mut question_ids = group.question_ids.clone();
                if randomize {
                    self.random.shuffle(&mut question_ids);
                }
                TopicGroup {
                    topic_id: group.topic_id,
                    topic_title: group.topic_title.clone(),
                    question_ids,
                }
            })
            .collect();

        tracing::debug!(variant_number, randomize, "Derived exam variant from master");
        Snapshot::new(topics)
    }
}
