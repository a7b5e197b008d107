use crate::common::server_utils::{create_test_server, create_test_server_with};
use axum::http::StatusCode;
use axum_test::TestServer;
use postwright_service::models::ImageModel;
use postwright_service::repositories::PostRepository;
use postwright_service::test_helpers::{
    StubBlobStore, StubClients, StubImageGenerator, TestHarness,
};
use serde_json::{Value, json};
use std::sync::Arc;

async fn post_with_images(server: &TestServer, harness: &TestHarness) -> i64 {
    let response = server
        .post("/api/v1/posts")
        .json(&json!({ "url": "https://example.com/payments" }))
        .await;
    let id = response.json::<Value>()["id"].as_i64().unwrap();
    harness.run_scheduled_jobs().await;
    id
}

#[tokio::test]
async fn test_regenerate_replaces_only_requested_slot() {
    let (server, harness) = create_test_server();
    let id = post_with_images(&server, &harness).await;

    let response = server
        .post(&format!("/api/v1/posts/{id}/regenerate-image"))
        .json(&json!({
            "prompt_text": "flat illustration of a vault door",
            "model_type": "titan",
            "image_number": 1
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(
        body["image_url"],
        format!("https://cdn.test/post_{id}_regenerated_1.png")
    );
    assert_eq!(body["prompt"], "flat illustration of a vault door");
    assert_eq!(body["model_type"], "titan");
    assert_eq!(body["image_number"], 1);

    let record = harness
        .posts
        .find_by_id(id as i32)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        record.image_url_1.as_deref(),
        Some(format!("https://cdn.test/post_{id}_regenerated_1.png").as_str())
    );
    assert_eq!(
        record.image_prompt_1.as_deref(),
        Some("flat illustration of a vault door")
    );
    assert_eq!(
        record.image_url_2.as_deref(),
        Some(format!("https://cdn.test/post_{id}_image_2.png").as_str())
    );
    assert_eq!(
        record.image_prompt_2.as_deref(),
        Some("soft gradient coins and arrows")
    );
    assert!(record.markdown_content.contains(&format!(
        "![Generated Image 1](https://cdn.test/post_{id}_regenerated_1.png)"
    )));
    assert!(record.markdown_content.contains(&format!(
        "![Generated Image 2](https://cdn.test/post_{id}_image_2.png)"
    )));

    let last_call = harness.stubs.images.calls().pop().unwrap();
    assert_eq!(
        last_call,
        ("flat illustration of a vault door".to_string(), ImageModel::Titan)
    );
}

#[tokio::test]
async fn test_regenerate_defaults_to_nova_first_slot() {
    let (server, harness) = create_test_server();
    let id = post_with_images(&server, &harness).await;

    let body: Value = server
        .post(&format!("/api/v1/posts/{id}/regenerate-image"))
        .json(&json!({ "prompt_text": "soft blue waves" }))
        .await
        .json();

    assert_eq!(body["model_type"], "nova");
    assert_eq!(body["image_number"], 1);
}

#[tokio::test]
async fn test_regenerate_second_slot_on_record_without_images() {
    let (server, harness) = create_test_server();
    let response = server
        .post("/api/v1/posts")
        .json(&json!({ "url": "https://example.com/payments" }))
        .await;
    let id = response.json::<Value>()["id"].as_i64().unwrap();

    let response = server
        .post(&format!("/api/v1/posts/{id}/regenerate-image"))
        .json(&json!({ "prompt_text": "paper cranes", "image_number": 2 }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let record = harness
        .posts
        .find_by_id(id as i32)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.image_url_1, None);
    assert!(record.image_url_2.is_some());
    assert!(record.images_pending, "regeneration does not finish the job");
}

#[tokio::test]
async fn test_regenerate_rejects_invalid_requests() {
    let (server, harness) = create_test_server();
    let id = post_with_images(&server, &harness).await;
    let before = harness
        .posts
        .find_by_id(id as i32)
        .await
        .unwrap()
        .unwrap();

    for payload in [
        json!({ "prompt_text": "   " }),
        json!({ "prompt_text": "ok", "image_number": 3 }),
        json!({ "prompt_text": "ok", "image_number": 0 }),
        json!({ "prompt_text": "ok", "model_type": "dalle" }),
        json!({ "prompt_text": "ok", "model_type": 5 }),
        json!({ "prompt_text": "ok", "image_number": "two" }),
        json!({ "prompt_text": 12 }),
    ] {
        let response = server
            .post(&format!("/api/v1/posts/{id}/regenerate-image"))
            .json(&payload)
            .await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST, "{payload}");
        assert!(response.json::<Value>()["error"].is_string());
    }

    let after = harness
        .posts
        .find_by_id(id as i32)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_regenerate_unknown_post_returns_404() {
    let (server, _harness) = create_test_server();

    let response = server
        .post("/api/v1/posts/4242/regenerate-image")
        .json(&json!({ "prompt_text": "anything" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_regenerate_generation_failure_leaves_record_unchanged() {
    let (server, harness) = create_test_server_with(StubClients {
        images: Arc::new(StubImageGenerator::failing_for(&[ImageModel::Titan])),
        ..StubClients::default()
    });
    let id = post_with_images(&server, &harness).await;
    let before = harness
        .posts
        .find_by_id(id as i32)
        .await
        .unwrap()
        .unwrap();
    assert!(before.image_url_1.is_some());
    assert_eq!(before.image_url_2, None);

    let response = server
        .post(&format!("/api/v1/posts/{id}/regenerate-image"))
        .json(&json!({ "prompt_text": "gold bars", "model_type": "titan", "image_number": 1 }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_GATEWAY);

    let after = harness
        .posts
        .find_by_id(id as i32)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_regenerate_accepts_numeric_string_slot() {
    let (server, harness) = create_test_server();
    let id = post_with_images(&server, &harness).await;

    let response = server
        .post(&format!("/api/v1/posts/{id}/regenerate-image"))
        .json(&json!({ "prompt_text": "paper cranes", "image_number": "2" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>()["image_number"], 2);

    let record = harness
        .posts
        .find_by_id(id as i32)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        record.image_url_2.as_deref(),
        Some(format!("https://cdn.test/post_{id}_regenerated_2.png").as_str())
    );
}

#[tokio::test]
async fn test_regenerate_malformed_body_returns_json_400() {
    let (server, _harness) = create_test_server();

    let response = server
        .post("/api/v1/posts/1/regenerate-image")
        .text("{\"prompt_text\": ")
        .content_type("application/json")
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert!(response.json::<Value>()["error"].is_string());
}

#[tokio::test]
async fn test_regenerate_upload_failure_leaves_record_unchanged() {
    let (server, harness) = create_test_server_with(StubClients {
        blobs: Arc::new(StubBlobStore::failing_when(&["regenerated"])),
        ..StubClients::default()
    });
    let id = post_with_images(&server, &harness).await;
    let before = harness
        .posts
        .find_by_id(id as i32)
        .await
        .unwrap()
        .unwrap();
    assert!(before.image_url_1.is_some());

    let response = server
        .post(&format!("/api/v1/posts/{id}/regenerate-image"))
        .json(&json!({ "prompt_text": "gold bars", "image_number": 1 }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_GATEWAY);
    assert!(response.json::<Value>()["error"].is_string());

    let after = harness
        .posts
        .find_by_id(id as i32)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(before, after);
}
