use crate::common::{at, server_utils::create_test_server};
use axum::http::StatusCode;
use postwright_service::models::{GeneratedCopy, NewPostRecord};
use postwright_service::repositories::PostRepository;
use postwright_service::routes::web::DEFAULT_INSTRUCTIONS;

#[tokio::test]
async fn test_form_page_renders() {
    let (server, _harness) = create_test_server();

    let response = server.get("/web").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let html = response.text();
    assert!(html.contains("<form method=\"post\" action=\"/web/generate\">"));
    assert!(html.contains("name=\"url\""));
    assert!(html.contains(DEFAULT_INSTRUCTIONS));
    assert!(html.contains("Please create a professional LinkedIn post that:"));
}

#[tokio::test]
async fn test_form_submission_redirects_to_post() {
    let (server, harness) = create_test_server();

    let response = server
        .post("/web/generate")
        .form(&[("url", "https://example.com/payments"), ("instructions", "")])
        .await;
    assert_eq!(response.status_code(), StatusCode::SEE_OTHER);

    let location = response.header("location");
    let location = location.to_str().unwrap();
    assert!(location.starts_with("/web/posts/"));
    assert_eq!(harness.scheduler.jobs().len(), 1);

    let page = server.get(location).await;
    assert_eq!(page.status_code(), StatusCode::OK);
    let html = page.text();
    assert!(html.contains("Banks are modernising how money moves between accounts."));
    assert!(html.contains("Images are still being generated"));
}

#[tokio::test]
async fn test_form_fetch_error_renders_page() {
    let (server, _harness) = create_test_server();

    let response = server
        .post("/web/generate")
        .form(&[("url", "ftp://example.com/file")])
        .await;
    assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(response.text().contains("<h1>Something went wrong</h1>"));
}

#[tokio::test]
async fn test_history_escapes_html() {
    let (server, harness) = create_test_server();

    let copy = GeneratedCopy {
        post: "post".into(),
        summary: "<script>alert('x')</script> & more".into(),
        rationale: "because".into(),
    };
    harness
        .posts
        .create(&NewPostRecord::new(
            "https://example.com/a".into(),
            "article".into(),
            None,
            copy,
            at(2025, 4, 5, 6, 7),
        ))
        .await
        .unwrap();

    let html = server.get("/web/history").await.text();
    assert!(!html.contains("<script>"));
    assert!(html.contains("&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt; &amp; more"));
    assert!(html.contains("2025-04-05 06:07 UTC"));
}

#[tokio::test]
async fn test_unknown_post_page_is_404() {
    let (server, _harness) = create_test_server();

    let response = server.get("/web/posts/77").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}
