//! Facade tying pool resolution, sampling and variant derivation to the
//! snapshot store.
//!
//! Every delivery or export goes through [`SnapshotEngine::get_or_create`]. A
//! stored row is returned as-is; otherwise variant 1 is sampled from the
//! question bank and variants 2..N are derived from it. Content is written
//! once and only replaced by an explicit [`SnapshotEngine::regenerate`].

use std::path::Path;
use std::sync::Arc;

use validator::Validate;

use crate::error::{SnapshotError, SnapshotResult};
use crate::metrics::{record_snapshot_request, SHARED_POOL_ACTIVATIONS_TOTAL, SNAPSHOT_EXPORTS_TOTAL};
use crate::models::{instance_id, Assignment, ExportMetadata, Question, Snapshot, SnapshotRecord, TopicGroup};
use crate::services::pool_config::{PoolConfigResolver, PoolPlan, TopicAllocation};
use crate::services::question_bank::QuestionBank;
use crate::services::sampler::{RandomSource, Sampler};
use crate::services::snapshot_store::SnapshotStore;
use crate::services::variant_generator::VariantGenerator;

const MASTER_VARIANT: u32 = 1;

/// Provenance applied to every variant of a bulk export.
#[derive(Debug, Clone, Default)]
pub struct BulkExport {
    pub exported_by: Option<i64>,
    /// Each variant's `file_path` becomes `<output_dir>/<instance_id>.pdf`.
    pub output_dir: Option<String>,
    pub notes: Option<String>,
}

pub struct SnapshotEngine {
    bank: Arc<dyn QuestionBank>,
    store: Arc<dyn SnapshotStore>,
    resolver: PoolConfigResolver,
    sampler: Sampler,
    variants: VariantGenerator,
}

impl SnapshotEngine {
    pub fn new(
        bank: Arc<dyn QuestionBank>,
        store: Arc<dyn SnapshotStore>,
        random: RandomSource,
    ) -> Self {
        Self {
            sampler: Sampler::new(bank.clone(), random.clone()),
            variants: VariantGenerator::new(random),
            resolver: PoolConfigResolver::new(),
            bank,
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn SnapshotStore> {
        &self.store
    }

    pub async fn get_or_create(
        &self,
        assignment: &Assignment,
        variant_number: u32,
    ) -> SnapshotResult<SnapshotRecord> {
        validate_request(assignment, variant_number)?;

        if let Some(existing) = self.store.get(assignment.id, variant_number).await? {
            record_snapshot_request("hit");
            tracing::debug!(
                assignment_id = assignment.id,
                variant_number,
                "Serving stored exam snapshot"
            );
            return Ok(existing);
        }

        if variant_number == MASTER_VARIANT {
            return self.create_master(assignment).await;
        }

        let master = self.master(assignment).await?;
        let derived = self.variants.derive(
            &master.question_snapshot,
            variant_number,
            assignment.randomize_questions,
        );
        let committed = self
            .store
            .put(assignment.id, variant_number, &derived, &ExportMetadata::now(), false)
            .await?;

        record_snapshot_request("derived");
        tracing::info!(
            assignment_id = assignment.id,
            variant_number,
            instance_id = %committed.instance_id(),
            "Exam variant derived from master"
        );
        Ok(committed)
    }

    /// Re-export: content stays as stored, provenance is replaced.
    pub async fn record_export(
        &self,
        assignment: &Assignment,
        variant_number: u32,
        metadata: ExportMetadata,
    ) -> SnapshotResult<SnapshotRecord> {
        let current = self.get_or_create(assignment, variant_number).await?;
        let committed = self
            .store
            .put(
                assignment.id,
                variant_number,
                &current.question_snapshot,
                &metadata,
                false,
            )
            .await?;

        SNAPSHOT_EXPORTS_TOTAL.with_label_values(&["single"]).inc();
        tracing::info!(
            assignment_id = assignment.id,
            variant_number,
            exported_by = ?metadata.exported_by,
            file_path = ?metadata.file_path,
            "Exam variant export recorded"
        );
        Ok(committed)
    }

    /// Records an export of every variant `1..=pdf_variant_count`.
    pub async fn export_variants(
        &self,
        assignment: &Assignment,
        request: &BulkExport,
    ) -> SnapshotResult<Vec<SnapshotRecord>> {
        assignment.validate()?;

        let mut exported = Vec::with_capacity(assignment.pdf_variant_count as usize);
        for variant_number in 1..=assignment.pdf_variant_count {
            let file_path = request.output_dir.as_deref().map(|dir| {
                Path::new(dir)
                    .join(format!("{}.pdf", instance_id(assignment.id, variant_number)))
                    .to_string_lossy()
                    .into_owned()
            });
            let metadata = ExportMetadata::by(request.exported_by)
                .with_file_path(file_path)
                .with_notes(request.notes.clone());

            exported.push(self.record_export(assignment, variant_number, metadata).await?);
        }

        SNAPSHOT_EXPORTS_TOTAL.with_label_values(&["bulk"]).inc();
        Ok(exported)
    }

    /// Explicit cache-bust after topics or quotas changed: samples a new
    /// master and re-derives every stored variant from it.
    ///
    /// Stored rows are dropped before the new master is written. A write
    /// failing midway leaves variants missing rather than stale, and
    /// [`SnapshotEngine::get_or_create`] re-derives them from whichever
    /// master is committed.
    pub async fn regenerate(&self, assignment: &Assignment) -> SnapshotResult<Vec<SnapshotRecord>> {
        assignment.validate()?;

        let stored = self.store.list(assignment.id).await?;
        let metadata_of = |variant_number: u32| {
            stored
                .iter()
                .find(|row| row.variant_number == variant_number)
                .map(|row| row.metadata.clone())
        };

        let master = self.select(assignment).await?;
        let dropped = self.store.invalidate(assignment.id).await?;
        tracing::debug!(
            assignment_id = assignment.id,
            dropped,
            "Dropped stored exam snapshots before regeneration"
        );

        let mut regenerated = vec![
            self.store
                .put(
                    assignment.id,
                    MASTER_VARIANT,
                    &master,
                    &metadata_of(MASTER_VARIANT).unwrap_or_else(ExportMetadata::now),
                    true,
                )
                .await?,
        ];

        for row in stored.iter().filter(|row| row.variant_number != MASTER_VARIANT) {
            let derived = self
                .variants
                .derive(&master, row.variant_number, assignment.randomize_questions);
            regenerated.push(
                self.store
                    .put(assignment.id, row.variant_number, &derived, &row.metadata, true)
                    .await?,
            );
        }

        tracing::info!(
            assignment_id = assignment.id,
            variants = regenerated.len(),
            total_questions = master.total_questions(),
            "Exam snapshots regenerated"
        );
        Ok(regenerated)
    }

    pub async fn invalidate(&self, assignment_id: i64) -> SnapshotResult<u64> {
        self.store.invalidate(assignment_id).await
    }

    pub async fn list(&self, assignment_id: i64) -> SnapshotResult<Vec<SnapshotRecord>> {
        self.store.list(assignment_id).await
    }

    /// Runs resolution and sampling without touching the store.
    pub async fn select(&self, assignment: &Assignment) -> SnapshotResult<Snapshot> {
        let selections: Vec<(i64, Vec<Question>)> = match self.resolver.resolve(assignment) {
            PoolPlan::PerTopic { topics } => {
                let mut selections = Vec::with_capacity(topics.len());
                for topic in topics {
                    let questions = match topic.allocation {
                        TopicAllocation::EntireBank => {
                            self.sampler.take_entire_bank(topic.topic_id).await?
                        }
                        TopicAllocation::Quota(quota) => {
                            self.sampler.sample_per_topic(topic.topic_id, &quota).await?
                        }
                    };
                    selections.push((topic.topic_id, questions));
                }
                selections
            }
            PoolPlan::SharedPool { topic_ids, quota } => {
                SHARED_POOL_ACTIVATIONS_TOTAL.inc();
                let mut by_topic = self.sampler.sample_shared(&topic_ids, &quota).await?;
                topic_ids
                    .into_iter()
                    .map(|topic_id| (topic_id, by_topic.remove(&topic_id).unwrap_or_default()))
                    .collect()
            }
        };

        let mut groups = Vec::with_capacity(selections.len());
        for (topic_id, questions) in selections {
            let mut question_ids: Vec<i64> = questions.into_iter().map(|q| q.id).collect();
            if assignment.randomize_questions {
                self.sampler.shuffle(&mut question_ids);
            }
            groups.push(TopicGroup {
                topic_id,
                topic_title: self.topic_title(topic_id).await?,
                question_ids,
            });
        }

        let snapshot = Snapshot::new(groups);
        if snapshot.is_empty() {
            tracing::warn!(
                assignment_id = assignment.id,
                "Assignment resolved to no questions; storing empty snapshot"
            );
        }
        Ok(snapshot)
    }

    async fn master(&self, assignment: &Assignment) -> SnapshotResult<SnapshotRecord> {
        match self.store.get(assignment.id, MASTER_VARIANT).await? {
            Some(master) => Ok(master),
            None => self.create_master(assignment).await,
        }
    }

    async fn create_master(&self, assignment: &Assignment) -> SnapshotResult<SnapshotRecord> {
        let selected = self.select(assignment).await?;
        let committed = self
            .store
            .put(assignment.id, MASTER_VARIANT, &selected, &ExportMetadata::now(), false)
            .await?;

        if committed.question_snapshot != selected {
            record_snapshot_request("conflict");
            tracing::info!(
                assignment_id = assignment.id,
                instance_id = %committed.instance_id(),
                "Another request stored the master snapshot first; discarding local selection"
            );
            return Ok(committed);
        }

        record_snapshot_request("created");
        tracing::info!(
            assignment_id = assignment.id,
            instance_id = %committed.instance_id(),
            total_questions = committed.question_snapshot.total_questions(),
            "Master exam snapshot created"
        );
        Ok(committed)
    }

    async fn topic_title(&self, topic_id: i64) -> SnapshotResult<String> {
        Ok(self
            .bank
            .topic(topic_id)
            .await?
            .map(|topic| topic.title)
            .unwrap_or_else(|| format!("Topic #{}", topic_id)))
    }
}

fn validate_request(assignment: &Assignment, variant_number: u32) -> SnapshotResult<()> {
    assignment.validate()?;
    if variant_number == 0 || variant_number > assignment.pdf_variant_count {
        return Err(SnapshotError::InvalidVariant {
            assignment_id: assignment.id,
            variant_number,
            max: assignment.pdf_variant_count,
        });
    }
    Ok(())
}
