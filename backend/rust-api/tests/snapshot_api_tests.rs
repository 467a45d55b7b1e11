mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use exam_snapshot_api::models::{Assignment, AssignmentTopic, Difficulty, DifficultyCounts};
use serde_json::json;
use std::collections::HashSet;

#[tokio::test]
async fn test_delivery_creates_master_and_variant() {
    let app = common::create_test_app();

    let (status, v1) = common::get(&app, "/api/v1/assignments/1/snapshots/1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v1["instance_id"], "EXAM-000001-V1");
    assert_eq!(v1["total_questions"], 3);
    assert_eq!(v1["topics"][0]["topic_title"], "Networking");

    let ids = common::question_ids(&v1);
    assert!(ids[..2].iter().all(|id| (1..=5).contains(id)));
    assert!((10..=12).contains(&ids[2]));

    let (status, v2) = common::get(&app, "/api/v1/assignments/1/snapshots/2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v2["instance_id"], "EXAM-000001-V2");
    assert_eq!(common::question_ids(&v2), ids);
    assert_eq!(app.store.len(), 2);
}

#[tokio::test]
async fn test_repeated_delivery_is_idempotent() {
    let app = common::create_test_app();

    let (_, first) = common::get(&app, "/api/v1/assignments/1/snapshots/1").await;
    let queries = app.bank.query_count();
    let (_, second) = common::get(&app, "/api/v1/assignments/1/snapshots/1").await;

    assert_eq!(common::question_ids(&first), common::question_ids(&second));
    assert_eq!(first["created_at"], second["created_at"]);
    assert_eq!(app.bank.query_count(), queries);
}

#[tokio::test]
async fn test_unknown_assignment_returns_404() {
    let app = common::create_test_app();
    let (status, body) = common::get(&app, "/api/v1/assignments/999/snapshots/1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);
}

#[tokio::test]
async fn test_variant_out_of_range_returns_400() {
    let app = common::create_test_app();

    for variant in [0, 3] {
        let (status, _) =
            common::get(&app, &format!("/api/v1/assignments/1/snapshots/{}", variant)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
    assert!(app.store.is_empty());
}

#[tokio::test]
async fn test_reexport_updates_metadata_only() {
    let app = common::create_test_app();
    let (_, original) = common::get(&app, "/api/v1/assignments/1/snapshots/1").await;

    let (status, exported) = common::post_json(
        &app,
        "/api/v1/assignments/1/snapshots/1/export",
        json!({ "exported_by": 17, "file_path": "/exports/reprint.pdf", "notes": "lost paper" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(common::question_ids(&exported), common::question_ids(&original));
    assert_eq!(exported["exported_by"], 17);
    assert_eq!(exported["file_path"], "/exports/reprint.pdf");
    assert_eq!(exported["notes"], "lost paper");
    assert_eq!(exported["created_at"], original["created_at"]);
}

#[tokio::test]
async fn test_export_rejects_invalid_body() {
    let app = common::create_test_app();
    let (status, _) = common::post_json(
        &app,
        "/api/v1/assignments/1/snapshots/1/export",
        json!({ "exported_by": 0 }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_bulk_export_uses_configured_export_dir() {
    let app = common::create_test_app();

    let (status, rows) =
        common::post_json(&app, "/api/v1/assignments/1/exports", json!({ "exported_by": 3 })).await;

    assert_eq!(status, StatusCode::OK);
    let paths: Vec<&str> = rows
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["file_path"].as_str().unwrap())
        .collect();
    assert_eq!(
        paths,
        vec!["/var/exports/EXAM-000001-V1.pdf", "/var/exports/EXAM-000001-V2.pdf"]
    );
}

#[tokio::test]
async fn test_list_and_invalidate_snapshots() {
    let app = common::create_test_app();
    common::get(&app, "/api/v1/assignments/1/snapshots/2").await;

    let (status, rows) = common::get(&app, "/api/v1/assignments/1/snapshots").await;
    assert_eq!(status, StatusCode::OK);
    let variants: Vec<i64> = rows
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["variant_number"].as_i64().unwrap())
        .collect();
    assert_eq!(variants, vec![1, 2]);

    let (status, body) = common::send(
        &app,
        Request::builder()
            .method("DELETE")
            .uri("/api/v1/assignments/1/snapshots")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 2);
    assert!(app.store.is_empty());
}

#[tokio::test]
async fn test_regenerate_picks_up_bank_changes() {
    let app = common::create_test_app();
    common::get(&app, "/api/v1/assignments/1/snapshots/1").await;
    common::get(&app, "/api/v1/assignments/1/snapshots/2").await;

    for id in 1..=5 {
        app.bank.set_active(id, false);
    }
    app.bank.add_questions(1, Difficulty::Easy, [30, 31]);

    let (status, rows) =
        common::post_json(&app, "/api/v1/assignments/1/snapshots/regenerate", json!({})).await;
    assert_eq!(status, StatusCode::OK);

    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    let master = common::question_ids(&rows[0]);
    assert_eq!(&master[..2], &[30, 31]);

    let master_set: HashSet<i64> = master.iter().copied().collect();
    let variant_set: HashSet<i64> = common::question_ids(&rows[1]).into_iter().collect();
    assert_eq!(master_set, variant_set);
}

#[tokio::test]
async fn test_shared_pool_assignment_over_http() {
    let app = common::create_test_app();
    app.bank.add_topic(2, "Security");
    app.bank.add_questions(2, Difficulty::Easy, 40..=42);
    app.assignments.insert(Assignment {
        id: 2,
        topics: vec![
            AssignmentTopic::new(1, 0, DifficultyCounts::default()),
            AssignmentTopic::new(2, 1, DifficultyCounts::default()),
        ],
        assignment_level: DifficultyCounts::new(5, 0, 0),
        use_question_pool: true,
        randomize_questions: true,
        pdf_variant_count: 1,
    });

    let (status, snapshot) = common::get(&app, "/api/v1/assignments/2/snapshots/1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot["total_questions"], 5);
    assert_eq!(snapshot["topics"][1]["topic_title"], "Security");
}

#[tokio::test]
async fn test_pool_report_flags_shortfall() {
    let app = common::create_test_app();
    app.assignments.insert(Assignment {
        id: 3,
        topics: vec![AssignmentTopic::new(1, 0, DifficultyCounts::new(7, 1, 0))],
        assignment_level: DifficultyCounts::default(),
        use_question_pool: true,
        randomize_questions: false,
        pdf_variant_count: 1,
    });

    let (status, report) = common::get(&app, "/api/v1/assignments/3/pool-report").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["feasible"], false);
    assert_eq!(
        report["shortfalls"][0]["message"],
        "Requested 7 easy questions but only 5 available"
    );
    assert_eq!(report["plan"]["mode"], "per_topic");
}

#[tokio::test]
async fn test_topic_pool_stats() {
    let app = common::create_test_app();
    let (status, stats) = common::get(&app, "/api/v1/topics/1/pool-stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats, json!({ "topic_id": 1, "total": 9, "easy": 5, "medium": 3, "hard": 1 }));
}

#[tokio::test]
async fn test_health_and_trace_header() {
    let app = common::create_test_app();
    let response = tower::ServiceExt::oneshot(
        app.router.clone(),
        Request::builder()
            .uri("/health")
            .header("x-trace-id", "trace-123")
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-trace-id"], "trace-123");
}

#[tokio::test]
async fn test_metrics_requires_basic_auth() {
    let app = common::create_test_app();

    let (status, _) = common::get(&app, "/metrics").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = common::send(
        &app,
        Request::builder()
            .uri("/metrics")
            .header("authorization", common::basic_auth(common::METRICS_AUTH))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_str().unwrap().contains("http_requests_total"));
}
