mod common;

use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use eventsource_stream::Eventsource;
use futures::StreamExt;
use httpmock::prelude::*;
use serde_json::{Value, json};
use std::convert::Infallible;
use std::time::Duration;
use tower::ServiceExt;
use webaudit::db::models::Role;

use common::{gemini_reply, spawn_app, test_config};

const GEMINI_PATH: &str = "/v1beta/models/gemini-2.0-flash:generateContent";

fn content_answer() -> String {
    json!({
        "score": 72,
        "summary": "Clear copy with thin headings.",
        "readability": "good",
        "seo_issues": ["missing meta description"],
        "suggestions": ["add an H2 per section"],
        "keywords": ["audits"]
    })
    .to_string()
}

#[tokio::test]
async fn free_tier_without_credits_is_denied() {
    let mock = MockServer::start_async().await;
    let gemini = mock
        .mock_async(|when, then| {
            when.method(POST).path(GEMINI_PATH);
            then.status(200).json_body(gemini_reply(&content_answer()));
        })
        .await;
    let app = spawn_app(test_config(&mock)).await;
    let (_, key) = app.user("free@example.com", Role::User).await;

    let (status, body) = app
        .post("/api/analyze/content", &key, json!({"content": "Some page copy"}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "PLAN_ACCESS_DENIED");
    assert_eq!(gemini.hits_async().await, 0);
}

#[tokio::test]
async fn credit_pays_for_inline_content_analysis() {
    let mock = MockServer::start_async().await;
    let gemini = mock
        .mock_async(|when, then| {
            when.method(POST)
                .path(GEMINI_PATH)
                .header("x-goog-api-key", "gemini-test-key")
                .body_contains("rust audits");
            then.status(200).json_body(gemini_reply(&content_answer()));
        })
        .await;
    let app = spawn_app(test_config(&mock)).await;
    let (user, key) = app.user("buyer@example.com", Role::User).await;
    app.state.storage.add_credits(user.id, 2).await.unwrap();

    let (status, body) = app
        .post(
            "/api/analyze/content",
            &key,
            json!({"content": "Some page copy", "keywords": ["rust audits"]}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["grant"], "credit");
    assert_eq!(body["data"]["url"], "inline");
    assert_eq!(body["data"]["analysis"]["score"], 72.0);
    assert_eq!(
        body["data"]["analysis"]["seo_issues"],
        json!(["missing meta description"])
    );
    gemini.assert_async().await;

    let user = app.state.storage.get_user(user.id).await.unwrap();
    assert_eq!(user.credits, 1);
    assert_eq!(app.state.storage.count_audits(user.id).await.unwrap(), 1);
}

#[tokio::test]
async fn invalid_input_is_rejected_before_spending_a_credit() {
    let mock = MockServer::start_async().await;
    let app = spawn_app(test_config(&mock)).await;
    let (user, key) = app.user("buyer@example.com", Role::User).await;
    app.state.storage.add_credits(user.id, 1).await.unwrap();

    let (status, body) = app.post("/api/analyze/content", &key, json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_REQUEST");

    let (status, _) = app
        .post("/api/analyze/content", &key, json!({"url": "file:///etc/passwd"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let user = app.state.storage.get_user(user.id).await.unwrap();
    assert_eq!(user.credits, 1);
}

#[tokio::test]
async fn page_is_fetched_and_plain_answers_become_the_summary() {
    let mock = MockServer::start_async().await;
    mock.mock_async(|when, then| {
        when.method(GET).path("/article");
        then.status(200)
            .header("content-type", "text/html")
            .body("<html><body><h1>Launch notes</h1><script>track()</script><p>We shipped.</p></body></html>");
    })
    .await;
    let gemini = mock
        .mock_async(|when, then| {
            when.method(POST).path(GEMINI_PATH).body_contains("Launch notes We shipped.");
            then.status(200)
                .json_body(gemini_reply("The page is short but clear."));
        })
        .await;
    let app = spawn_app(test_config(&mock)).await;
    let (_, key) = app.user("admin@example.com", Role::Admin).await;

    let (status, body) = app
        .post("/api/analyze/content", &key, json!({"url": mock.url("/article")}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["grant"], "admin");
    assert_eq!(
        body["data"]["analysis"]["summary"],
        "The page is short but clear."
    );
    assert_eq!(body["data"]["analysis"]["score"], Value::Null);
    gemini.assert_async().await;
}

#[tokio::test]
async fn upstream_gemini_errors_pass_their_status_through() {
    let mock = MockServer::start_async().await;
    mock.mock_async(|when, then| {
        when.method(POST).path(GEMINI_PATH);
        then.status(429).json_body(json!({
            "error": {"code": 429, "message": "Quota exhausted", "status": "RESOURCE_EXHAUSTED"}
        }));
    })
    .await;
    let app = spawn_app(test_config(&mock)).await;
    let (_, key) = app.user("admin@example.com", Role::Admin).await;

    let (status, body) = app
        .post("/api/analyze/content", &key, json!({"content": "copy"}))
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["code"], "RESOURCE_EXHAUSTED");
}

#[tokio::test]
async fn image_is_sent_inline_and_must_be_an_image() {
    let mock = MockServer::start_async().await;
    mock.mock_async(|when, then| {
        when.method(GET).path("/logo.png");
        then.status(200)
            .header("content-type", "image/png")
            .body(vec![0x89, b'P', b'N', b'G', 0, 1, 2, 3]);
    })
    .await;
    mock.mock_async(|when, then| {
        when.method(GET).path("/page.html");
        then.status(200).header("content-type", "text/html").body("<p>hi</p>");
    })
    .await;
    let gemini = mock
        .mock_async(|when, then| {
            when.method(POST)
                .path(GEMINI_PATH)
                .body_contains("\"mimeType\":\"image/png\"");
            then.status(200).json_body(gemini_reply(
                r#"{"score": 40, "description": "A logo", "alt_text": "Acme logo", "issues": ["alt text missing"]}"#,
            ));
        })
        .await;
    let app = spawn_app(test_config(&mock)).await;
    let (_, key) = app.user("admin@example.com", Role::Admin).await;

    let (status, body) = app
        .post("/api/analyze/image", &key, json!({"image_url": mock.url("/logo.png")}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["analysis"]["alt_text"], "Acme logo");
    gemini.assert_async().await;

    let (status, body) = app
        .post("/api/analyze/image", &key, json!({"image_url": mock.url("/page.html")}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn oversized_images_are_rejected() {
    let mock = MockServer::start_async().await;
    mock.mock_async(|when, then| {
        when.method(GET).path("/huge.jpg");
        then.status(200)
            .header("content-type", "image/jpeg")
            .body(vec![0u8; 64]);
    })
    .await;
    let mut cfg = test_config(&mock);
    cfg.gemini.max_image_bytes = 16;
    let app = spawn_app(cfg).await;
    let (_, key) = app.user("admin@example.com", Role::Admin).await;

    let (status, _) = app
        .post("/api/analyze/image", &key, json!({"image_url": mock.url("/huge.jpg")}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

async fn read_events(body: Body) -> Vec<(String, Value)> {
    let bytes = to_bytes(body, usize::MAX).await.unwrap();
    futures::stream::iter(vec![Ok::<_, Infallible>(bytes)])
        .eventsource()
        .filter_map(|ev| async move { ev.ok() })
        .filter(|ev| futures::future::ready(!ev.event.is_empty()))
        .map(|ev| (ev.event, serde_json::from_str(&ev.data).unwrap_or(Value::Null)))
        .collect()
        .await
}

#[tokio::test]
async fn stream_reports_progress_then_result() {
    let mock = MockServer::start_async().await;
    mock.mock_async(|when, then| {
        when.method(POST).path(GEMINI_PATH);
        then.status(200)
            .delay(Duration::from_millis(150))
            .json_body(gemini_reply(&content_answer()));
    })
    .await;
    let app = spawn_app(test_config(&mock)).await;
    let (_, key) = app.user("admin@example.com", Role::Admin).await;

    let req = Request::builder()
        .method("POST")
        .uri("/api/analyze/content/stream")
        .header("authorization", format!("Bearer {key}"))
        .header("content-type", "application/json")
        .body(Body::from(json!({"content": "copy"}).to_string()))
        .unwrap();
    let resp = app.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(
        resp.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream")
    );

    let events = read_events(resp.into_body()).await;
    let (last_name, last) = events.last().expect("at least one event");
    assert_eq!(last_name, "result");
    assert_eq!(last["data"]["analysis"]["score"], 72.0);

    let progress: Vec<&Value> = events
        .iter()
        .filter(|(name, _)| name == "progress")
        .map(|(_, data)| data)
        .collect();
    assert!(!progress.is_empty());
    assert_eq!(progress[0]["stage"], "analyzing");
    assert!(progress.iter().all(|p| p["percent"].as_u64().unwrap() <= 95));
}

#[tokio::test]
async fn stream_failures_arrive_as_error_events() {
    let mock = MockServer::start_async().await;
    mock.mock_async(|when, then| {
        when.method(POST).path(GEMINI_PATH);
        then.status(502).body("bad gateway");
    })
    .await;
    let app = spawn_app(test_config(&mock)).await;
    let (_, key) = app.user("admin@example.com", Role::Admin).await;
    let (_, free_key) = app.user("free@example.com", Role::User).await;

    let (status, body) = app
        .post("/api/analyze/content/stream", &free_key, json!({"content": "copy"}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "PLAN_ACCESS_DENIED");

    let req = Request::builder()
        .method("POST")
        .uri("/api/analyze/content/stream")
        .header("authorization", format!("Bearer {key}"))
        .header("content-type", "application/json")
        .body(Body::from(json!({"content": "copy"}).to_string()))
        .unwrap();
    let resp = app.router.clone().oneshot(req).await.unwrap();
    let events = read_events(resp.into_body()).await;
    let (name, data) = events.last().unwrap();
    assert_eq!(name, "error");
    assert_eq!(data["error"]["code"], "UPSTREAM_ERROR");
}

#[tokio::test]
async fn failed_upstream_call_gives_the_credit_back() {
    let mock = MockServer::start_async().await;
    mock.mock_async(|when, then| {
        when.method(POST).path(GEMINI_PATH);
        then.status(503).body("overloaded");
    })
    .await;
    mock.mock_async(|when, then| {
        when.method(GET).path("/blank");
        then.status(200).header("content-type", "text/html").body("<html><body> </body></html>");
    })
    .await;
    let app = spawn_app(test_config(&mock)).await;
    let (user, key) = app.user("buyer@example.com", Role::User).await;
    app.state.storage.add_credits(user.id, 1).await.unwrap();

    let (status, body) = app
        .post("/api/analyze/content", &key, json!({"content": "Some page copy"}))
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "UPSTREAM_UNAVAILABLE");

    let (status, _) = app
        .post("/api/analyze/content", &key, json!({"url": mock.url("/blank")}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let req = Request::builder()
        .method("POST")
        .uri("/api/analyze/content/stream")
        .header("x-api-key", key.as_str())
        .header("content-type", "application/json")
        .body(Body::from(json!({"content": "copy"}).to_string()))
        .unwrap();
    let resp = app.router.clone().oneshot(req).await.unwrap();
    let events = read_events(resp.into_body()).await;
    assert_eq!(events.last().unwrap().0, "error");

    let user = app.state.storage.get_user(user.id).await.unwrap();
    assert_eq!(user.credits, 1);
    assert_eq!(app.state.storage.count_audits(user.id).await.unwrap(), 0);
}
