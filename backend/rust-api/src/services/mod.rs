use std::sync::Arc;

use anyhow::Context;
use mongodb::Client as MongoClient;

use crate::config::Config;

use self::assignment_repository::{AssignmentRepository, MongoAssignmentRepository};
use self::pool_report::PoolReporter;
use self::question_bank::{MongoQuestionBank, QuestionBank};
use self::sampler::RandomSource;
use self::snapshot_engine::SnapshotEngine;
use self::snapshot_store::{MongoSnapshotStore, SnapshotStore};

pub struct AppState {
    pub config: Config,
    pub engine: SnapshotEngine,
    pub assignments: Arc<dyn AssignmentRepository>,
    pub reports: PoolReporter,
}

impl AppState {
    /// Wires the engine over the MongoDB adapters.
    pub async fn new(config: Config, mongo_client: MongoClient) -> anyhow::Result<Self> {
        let mongo = mongo_client.database(&config.mongo_database);

        let store = MongoSnapshotStore::new(mongo.clone());
        tokio::time::timeout(std::time::Duration::from_secs(30), store.ensure_indexes())
            .await
            .map_err(|_| anyhow::anyhow!("MongoDB index creation timeout after 30s"))?
            .context("Failed to prepare exam_snapshots collection")?;

        let bank: Arc<dyn QuestionBank> = Arc::new(MongoQuestionBank::new(mongo.clone()));
        let assignments: Arc<dyn AssignmentRepository> =
            Arc::new(MongoAssignmentRepository::new(mongo));

        Ok(Self::with_ports(config, bank, Arc::new(store), assignments))
    }

    pub fn with_ports(
        config: Config,
        bank: Arc<dyn QuestionBank>,
        store: Arc<dyn SnapshotStore>,
        assignments: Arc<dyn AssignmentRepository>,
    ) -> Self {
        let random = RandomSource::from_seed(config.selection_seed);
        if config.selection_seed.is_some() {
            tracing::warn!("Question selection uses a fixed seed; draws are reproducible");
        }

        Self {
            engine: SnapshotEngine::new(bank.clone(), store, random),
            reports: PoolReporter::new(bank),
            assignments,
            config,
        }
    }
}

pub mod assignment_repository;
pub mod pool_config;
pub mod pool_report;
pub mod question_bank;
pub mod sampler;
pub mod snapshot_engine;
pub mod snapshot_store;
pub mod variant_generator;
