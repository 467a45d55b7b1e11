#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use base64::{engine::general_purpose, Engine as _};
use exam_snapshot_api::{
    config::Config,
    create_router,
    models::{Assignment, AssignmentTopic, Difficulty, DifficultyCounts},
    services::{
        assignment_repository::InMemoryAssignmentRepository,
        question_bank::InMemoryQuestionBank, snapshot_store::InMemorySnapshotStore, AppState,
    },
};
use mongodb::{bson::doc, Database};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

pub const METRICS_AUTH: &str = "metrics:secret";

pub struct TestApp {
    pub router: Router,
    pub bank: Arc<InMemoryQuestionBank>,
    pub store: Arc<InMemorySnapshotStore>,
    pub assignments: Arc<InMemoryAssignmentRepository>,
}

pub fn test_config() -> Config {
    Config {
        mongo_uri: "mongodb://localhost:27017".to_string(),
        mongo_database: "exams_test".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        selection_seed: Some(7),
        export_dir: Some("/var/exports".to_string()),
        metrics_auth: METRICS_AUTH.to_string(),
    }
}

/// Router over in-memory adapters seeded with the "Networking" topic
/// (easy 1-5, medium 10-12, hard 20) and assignment 1 using it.
pub fn create_test_app() -> TestApp {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let bank = Arc::new(InMemoryQuestionBank::new());
    bank.add_topic(1, "Networking");
    bank.add_questions(1, Difficulty::Easy, 1..=5);
    bank.add_questions(1, Difficulty::Medium, 10..=12);
    bank.add_questions(1, Difficulty::Hard, [20]);

    let assignments = Arc::new(InMemoryAssignmentRepository::new());
    assignments.insert(networking_assignment());

    let store = Arc::new(InMemorySnapshotStore::new());
    let app_state = Arc::new(AppState::with_ports(
        test_config(),
        bank.clone(),
        store.clone(),
        assignments.clone(),
    ));

    TestApp {
        router: create_router(app_state),
        bank,
        store,
        assignments,
    }
}

pub fn networking_assignment() -> Assignment {
    Assignment {
        id: 1,
        topics: vec![AssignmentTopic::new(1, 0, DifficultyCounts::default())],
        assignment_level: DifficultyCounts::new(2, 1, 0),
        use_question_pool: true,
        randomize_questions: false,
        pdf_variant_count: 2,
    }
}

pub fn basic_auth(credentials: &str) -> String {
    format!("Basic {}", general_purpose::STANDARD.encode(credentials))
}

pub async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned()))
    };
    (status, json)
}

pub async fn get(app: &TestApp, uri: &str) -> (StatusCode, Value) {
    send(
        app,
        Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap(),
    )
    .await
}

pub async fn post_json(app: &TestApp, uri: &str, body: Value) -> (StatusCode, Value) {
    send(
        app,
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
}

pub fn question_ids(snapshot: &Value) -> Vec<i64> {
    snapshot["topics"]
        .as_array()
        .unwrap()
        .iter()
        .flat_map(|topic| topic["question_ids"].as_array().unwrap().clone())
        .map(|id| id.as_i64().unwrap())
        .collect()
}

/// Fresh, uniquely named database on the MongoDB from `.env.test`.
/// Returns `None` when no server answers, so live-store tests can skip.
pub async fn connect_test_database() -> Option<Database> {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    dotenvy::from_filename(".env.test").ok();
    let config = Config::load().expect("Failed to load test configuration");

    let client = mongodb::Client::with_uri_str(&config.mongo_uri)
        .await
        .expect("Failed to create test MongoDB client");
    let database = client.database(&format!(
        "{}_{}",
        config.mongo_database,
        uuid::Uuid::new_v4().simple()
    ));

    match tokio::time::timeout(Duration::from_secs(2), database.run_command(doc! { "ping": 1 })).await {
        Ok(Ok(_)) => Some(database),
        _ => {
            eprintln!("MongoDB at {} unreachable, skipping live store test", config.mongo_uri);
            None
        }
    }
}
