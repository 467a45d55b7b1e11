//! Bounded random sampling of questions without replacement.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::seq::{index, SliceRandom};
use rand::{RngCore, SeedableRng};

use crate::error::SnapshotResult;
use crate::metrics::QUESTION_SHORTFALL_TOTAL;
use crate::models::{Difficulty, DifficultyCounts, Question};
use crate::services::question_bank::QuestionBank;

/// The one place selection randomness comes from.
///
/// `System` draws from the thread RNG on every call. `Seeded` shares one
/// `StdRng` so a run can be replayed; the lock is never held across `.await`.
#[derive(Clone, Default)]
pub enum RandomSource {
    #[default]
    System,
    Seeded(Arc<Mutex<StdRng>>),
}

impl RandomSource {
    pub fn seeded(seed: u64) -> Self {
        RandomSource::Seeded(Arc::new(Mutex::new(StdRng::seed_from_u64(seed))))
    }

    pub fn from_seed(seed: Option<u64>) -> Self {
        seed.map(Self::seeded).unwrap_or(RandomSource::System)
    }

    pub fn with_rng<T>(&self, f: impl FnOnce(&mut dyn RngCore) -> T) -> T {
        match self {
            RandomSource::System => {
                let mut rng = rand::rng();
                f(&mut rng)
            }
            RandomSource::Seeded(rng) => {
                let mut guard = rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                f(&mut *guard)
            }
        }
    }

    /// Picks `amount` of `len` positions uniformly; result is ascending so the
    /// caller keeps storage order.
    pub fn sample_indices(&self, len: usize, amount: usize) -> Vec<usize> {
        if amount >= len {
            return (0..len).collect();
        }
        let mut picked = self.with_rng(|rng| index::sample(rng, len, amount).into_vec());
        picked.sort_unstable();
        picked
    }

    pub fn shuffle<T>(&self, items: &mut [T]) {
        self.with_rng(|rng| items.shuffle(rng));
    }
}

pub struct Sampler {
    bank: Arc<dyn QuestionBank>,
    random: RandomSource,
}

impl Sampler {
    pub fn new(bank: Arc<dyn QuestionBank>, random: RandomSource) -> Self {
        Self { bank, random }
    }

    /// Draws up to `quota[d]` questions of each difficulty from one topic.
    pub async fn sample_per_topic(
        &self,
        topic_id: i64,
        quota: &DifficultyCounts,
    ) -> SnapshotResult<Vec<Question>> {
        let mut selected = Vec::new();

        for difficulty in Difficulty::ALL {
            let requested = quota.get(difficulty) as usize;
            if requested == 0 {
                continue;
            }

            let available = self.bank.list_active_questions(topic_id, difficulty).await?;
            let drawn = self.draw(available, requested);
            if drawn.len() < requested {
                record_shortfall(Some(topic_id), difficulty, requested, drawn.len());
            }

            tracing::debug!(
                topic_id,
                difficulty = %difficulty,
                requested,
                selected = drawn.len(),
                "Sampled topic questions"
            );
            selected.extend(drawn);
        }

        Ok(selected)
    }

    /// Draws the quota once across the union of `topic_ids` and hands each
    /// drawn question back to its owning topic.
    pub async fn sample_shared(
        &self,
        topic_ids: &[i64],
        quota: &DifficultyCounts,
    ) -> SnapshotResult<HashMap<i64, Vec<Question>>> {
        let mut by_topic: HashMap<i64, Vec<Question>> =
            topic_ids.iter().map(|id| (*id, Vec::new())).collect();

        for difficulty in Difficulty::ALL {
            let requested = quota.get(difficulty) as usize;
            if requested == 0 {
                continue;
            }

            let available_count = self
                .bank
                .count_active_questions(topic_ids, difficulty)
                .await?;
            tracing::info!(
                difficulty = %difficulty,
                available = available_count,
                requested,
                topics = topic_ids.len(),
                "Shared pool availability across topics"
            );
            if available_count == 0 {
                record_shortfall(None, difficulty, requested, 0);
                continue;
            }

            let available = self
                .bank
                .list_active_questions_in(topic_ids, difficulty)
                .await?;
            let drawn = self.draw(available, requested);
            if drawn.len() < requested {
                record_shortfall(None, difficulty, requested, drawn.len());
            }

            for question in drawn {
                by_topic.entry(question.topic_id).or_default().push(question);
            }
        }

        Ok(by_topic)
    }

    /// Every active question of the topic, untouched.
    pub async fn take_entire_bank(&self, topic_id: i64) -> SnapshotResult<Vec<Question>> {
        self.bank.list_topic_questions(topic_id).await
    }

    pub fn shuffle(&self, question_ids: &mut [i64]) {
        self.random.shuffle(question_ids);
    }

    fn draw(&self, available: Vec<Question>, requested: usize) -> Vec<Question> {
        let take = requested.min(available.len());
        if take == available.len() {
            return available;
        }

        let picked = self.random.sample_indices(available.len(), take);
        let mut slots: Vec<Option<Question>> = available.into_iter().map(Some).collect();
        picked
            .into_iter()
            .filter_map(|position| slots[position].take())
            .collect()
    }
}

fn record_shortfall(topic_id: Option<i64>, difficulty: Difficulty, requested: usize, selected: usize) {
    QUESTION_SHORTFALL_TOTAL
        .with_label_values(&[difficulty.as_str()])
        .inc();

    match topic_id {
        Some(topic_id) => tracing::warn!(
            topic_id,
            difficulty = %difficulty,
            requested,
            available = selected,
            "Only {} {} questions available, but {} requested",
            selected,
            difficulty,
            requested
        ),
        None => tracing::warn!(
            difficulty = %difficulty,
            requested,
            available = selected,
            "Shared pool has only {} {} questions, but {} requested",
            selected,
            difficulty,
            requested
        ),
    }
}
