use crate::common::{at, server_utils::create_test_server, server_utils::create_test_server_with};
use axum::http::StatusCode;
use postwright_service::jobs::SchedulingError;
use postwright_service::repositories::PostRepository;
use postwright_service::test_helpers::{
    FailingScheduler, StubClients, StubFetcher, StubTextGenerator, TestHarness, sample_new_post,
};
use serde_json::{Value, json};
use std::sync::Arc;

#[tokio::test]
async fn test_submit_then_poll_until_images_complete() {
    let (server, harness) = create_test_server();

    let response = server
        .post("/api/v1/posts")
        .json(&json!({ "url": "https://example.com/payments" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    let id = response.json::<Value>()["id"].as_i64().unwrap();

    let status: Value = server
        .get(&format!("/api/v1/posts/{id}/image-status"))
        .await
        .json();
    assert_eq!(status["images_processing"], true);
    assert_eq!(status["images_completed"], false);
    assert_eq!(status["images_completed_at"], Value::Null);

    harness.run_scheduled_jobs().await;

    let status: Value = server
        .get(&format!("/api/v1/posts/{id}/image-status"))
        .await
        .json();
    assert_eq!(status["images_processing"], false);
    assert_eq!(status["images_completed"], true);
    assert_eq!(
        status["image_url_1"],
        format!("https://cdn.test/post_{id}_image_1.png")
    );
    assert_eq!(
        status["image_url_2"],
        format!("https://cdn.test/post_{id}_image_2.png")
    );
    assert!(status["images_completed_at"].as_str().unwrap().ends_with('Z'));
}

#[tokio::test]
async fn test_get_post_returns_full_record() {
    let (server, harness) = create_test_server();

    let response = server
        .post("/api/v1/posts")
        .json(&json!({ "url": "https://example.com/payments", "instructions": "  " }))
        .await;
    let id = response.json::<Value>()["id"].as_i64().unwrap();

    let record: Value = server.get(&format!("/api/v1/posts/{id}")).await.json();
    assert_eq!(record["source_url"], "https://example.com/payments");
    assert_eq!(record["instructions"], Value::Null);
    assert_eq!(
        record["summary"],
        "Banks are modernising how money moves between accounts."
    );
    assert_eq!(record["images_pending"], true);
    assert_eq!(record["image_url_1"], Value::Null);
    assert!(
        record["markdown_content"]
            .as_str()
            .unwrap()
            .starts_with("# Social Post\n\n## Post\n")
    );
    assert_eq!(harness.stubs.text.instructions_seen(), vec![None]);
}

#[tokio::test]
async fn test_list_posts_newest_first() {
    let (server, harness) = create_test_server();

    for (url, created_at) in [
        ("https://example.com/middle", at(2025, 3, 2, 12, 0)),
        ("https://example.com/oldest", at(2025, 3, 1, 12, 0)),
        ("https://example.com/newest", at(2025, 3, 3, 12, 0)),
    ] {
        harness
            .posts
            .create(&sample_new_post(url, created_at))
            .await
            .unwrap();
    }

    let response = server.get("/api/v1/posts").await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let body: Value = response.json();
    assert_eq!(body["total"], 3);
    let urls: Vec<&str> = body["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["source_url"].as_str().unwrap())
        .collect();
    assert_eq!(
        urls,
        vec![
            "https://example.com/newest",
            "https://example.com/middle",
            "https://example.com/oldest"
        ]
    );
    assert_eq!(body["items"][0]["image_count"], 0);
}

#[tokio::test]
async fn test_markdown_download_headers() {
    let (server, harness) = create_test_server();

    let record = harness
        .posts
        .create(&sample_new_post(
            "https://example.com/payments",
            at(2025, 6, 7, 8, 9),
        ))
        .await
        .unwrap();

    let response = server
        .get(&format!("/api/v1/posts/{}/markdown", record.id))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(
        response.header("content-type"),
        "text/markdown; charset=utf-8"
    );
    assert_eq!(
        response.header("content-disposition"),
        format!("attachment; filename=\"post_{}_20250607_0809.md\"", record.id).as_str()
    );
    assert_eq!(response.text(), record.markdown_content);
}

#[tokio::test]
async fn test_markdown_includes_images_after_job() {
    let (server, harness) = create_test_server();

    let response = server
        .post("/api/v1/posts")
        .json(&json!({ "url": "https://example.com/payments" }))
        .await;
    let id = response.json::<Value>()["id"].as_i64().unwrap();
    harness.run_scheduled_jobs().await;

    let markdown = server
        .get(&format!("/api/v1/posts/{id}/markdown"))
        .await
        .text();
    assert!(markdown.contains("## Generated Images\n"));
    assert!(markdown.contains(&format!(
        "![Generated Image 1](https://cdn.test/post_{id}_image_1.png)"
    )));
    assert!(markdown.contains(&format!(
        "![Generated Image 2](https://cdn.test/post_{id}_image_2.png)"
    )));
}

#[tokio::test]
async fn test_fetch_failure_stores_nothing() {
    let (server, harness) = create_test_server_with(StubClients {
        fetcher: Arc::new(StubFetcher::failing()),
        ..StubClients::default()
    });

    let response = server
        .post("/api/v1/posts")
        .json(&json!({ "url": "https://example.com/missing" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(harness.posts.list_newest_first().await.unwrap().is_empty());
    assert!(harness.scheduler.jobs().is_empty());
}

#[tokio::test]
async fn test_text_failure_stores_nothing() {
    let (server, harness) = create_test_server_with(StubClients {
        text: Arc::new(StubTextGenerator::failing()),
        ..StubClients::default()
    });

    let response = server
        .post("/api/v1/posts")
        .json(&json!({ "url": "https://example.com/payments" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_GATEWAY);
    assert!(harness.posts.list_newest_first().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_scheduling_failure_returns_record_not_pending() {
    let harness = TestHarness::new();
    let service = postwright_service::generation::GenerationService::new(
        harness.posts.clone(),
        harness.stubs.clients(),
        Arc::new(FailingScheduler(SchedulingError::QueueFull)),
    );

    let record = service
        .generate("https://example.com/payments", None)
        .await
        .unwrap();
    assert!(!record.images_pending);

    let stored = harness.posts.find_by_id(record.id).await.unwrap().unwrap();
    assert!(!stored.images_pending);
    assert_eq!(stored.images_completed_at, None);
    assert_eq!(stored.image_url_1, None);
}
