mod common;

use axum::http::StatusCode;
use httpmock::MockServer;
use serde_json::{Value, json};
use webaudit::db::models::Role;

use common::{ADMIN_KEY, TestApp, spawn_app, test_config};

fn plan_body(name: &str, features: Value, active: bool) -> Value {
    json!({
        "name": name,
        "description": "Monitoring for small sites",
        "price": 49_900,
        "currency": "inr",
        "interval": "monthly",
        "features": features,
        "audit_limit": 100,
        "gateway_plan_id": "plan_gw_1",
        "is_active": active,
    })
}

async fn subscribe(app: &TestApp, user_id: i64, plan_id: i64) {
    app.state
        .storage
        .set_user_plan(user_id, Some(plan_id), None)
        .await
        .expect("assign plan");
}

#[tokio::test]
async fn plans_crud_and_public_listing() {
    let mock = MockServer::start_async().await;
    let app = spawn_app(test_config(&mock)).await;
    let (_, user_key) = app.user("user@example.com", Role::User).await;

    let (status, body) = app
        .post("/api/admin/plans", ADMIN_KEY, plan_body("Pro", json!(["alerts"]), true))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["currency"], "INR");
    assert_eq!(body["data"]["features"], json!(["alerts"]));
    let pro_id = body["data"]["id"].as_i64().unwrap();

    let (status, _) = app
        .post("/api/admin/plans", ADMIN_KEY, plan_body("Legacy", json!([]), false))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .post("/api/admin/plans", ADMIN_KEY, plan_body("Pro", json!([]), true))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");

    let (_, public) = app.get("/api/plans", &user_key).await;
    let names: Vec<&str> = public["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Pro"]);

    let (_, all) = app.get("/api/admin/plans", ADMIN_KEY).await;
    assert_eq!(all["data"].as_array().unwrap().len(), 2);

    let mut update = plan_body("Pro Plus", json!(["alerts", "scrape"]), true);
    update["price"] = json!(59_900);
    let (status, body) = app
        .send("PUT", &format!("/api/admin/plans/{pro_id}"), Some(ADMIN_KEY), Some(update))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Pro Plus");
    assert_eq!(body["data"]["price"], 59_900);

    let (status, _) = app
        .send("DELETE", &format!("/api/admin/plans/{pro_id}"), Some(ADMIN_KEY), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app
        .send("DELETE", &format!("/api/admin/plans/{pro_id}"), Some(ADMIN_KEY), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn plan_validation_rejects_bad_fields() {
    let mock = MockServer::start_async().await;
    let app = spawn_app(test_config(&mock)).await;

    let mut bad_price = plan_body("Cheap", json!([]), true);
    bad_price["price"] = json!(0);
    let (status, _) = app.post("/api/admin/plans", ADMIN_KEY, bad_price).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post("/api/admin/plans", ADMIN_KEY, plan_body("Odd", json!(["teleport"]), true))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut bad_interval = plan_body("Weekly", json!([]), true);
    bad_interval["interval"] = json!("weekly");
    let (status, body) = app.post("/api/admin/plans", ADMIN_KEY, bad_interval).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn credit_packages_crud() {
    let mock = MockServer::start_async().await;
    let app = spawn_app(test_config(&mock)).await;
    let (_, user_key) = app.user("user@example.com", Role::User).await;

    let (status, body) = app
        .post(
            "/api/admin/credit-packages",
            ADMIN_KEY,
            json!({"name": "Starter", "credits": 10, "price": 9_900, "currency": "INR"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["data"]["id"].as_i64().unwrap();
    assert_eq!(body["data"]["is_active"], true);

    let (status, _) = app
        .post(
            "/api/admin/credit-packages",
            ADMIN_KEY,
            json!({"name": "Broken", "credits": -1, "price": 100, "currency": "INR"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(
            "PUT",
            &format!("/api/admin/credit-packages/{id}"),
            Some(ADMIN_KEY),
            Some(json!({"name": "Starter", "credits": 10, "price": 9_900, "currency": "INR", "is_active": false})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, public) = app.get("/api/credit-packages", &user_key).await;
    assert!(public["data"].as_array().unwrap().is_empty());
    let (_, all) = app.get("/api/admin/credit-packages", ADMIN_KEY).await;
    assert_eq!(all["data"].as_array().unwrap().len(), 1);

    let (status, _) = app
        .send("DELETE", &format!("/api/admin/credit-packages/{id}"), Some(ADMIN_KEY), None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn alerts_need_a_plan_with_the_alerts_feature() {
    let mock = MockServer::start_async().await;
    let app = spawn_app(test_config(&mock)).await;
    let (_, key) = app.user("free@example.com", Role::User).await;

    let (status, body) = app.get("/api/alerts", &key).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "PLAN_ACCESS_DENIED");
}

#[tokio::test]
async fn alerts_crud_is_scoped_to_owner() {
    let mock = MockServer::start_async().await;
    let app = spawn_app(test_config(&mock)).await;
    let (_, body) = app
        .post("/api/admin/plans", ADMIN_KEY, plan_body("Pro", json!(["alerts"]), true))
        .await;
    let plan_id = body["data"]["id"].as_i64().unwrap();

    let (alice, alice_key) = app.user("alice@example.com", Role::User).await;
    let (bob, bob_key) = app.user("bob@example.com", Role::User).await;
    subscribe(&app, alice.id, plan_id).await;
    subscribe(&app, bob.id, plan_id).await;

    let (status, body) = app
        .post(
            "/api/alerts",
            &alice_key,
            json!({
                "name": "Home page slow",
                "url": "https://example.com",
                "metric": "performance_score",
                "comparison": "below",
                "threshold": 60
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["enabled"], true);
    let id = body["data"]["id"].as_i64().unwrap();

    let (status, _) = app
        .post(
            "/api/alerts",
            &alice_key,
            json!({"name": "x", "metric": "content_score", "comparison": "above", "threshold": 150}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.get(&format!("/api/alerts/{id}"), &bob_key).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, bobs) = app.get("/api/alerts", &bob_key).await;
    assert!(bobs["data"].as_array().unwrap().is_empty());

    let (status, body) = app
        .send(
            "PUT",
            &format!("/api/alerts/{id}"),
            Some(&alice_key),
            Some(json!({
                "name": "Home page slow",
                "metric": "performance_score",
                "comparison": "below",
                "threshold": 40,
                "enabled": false
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["threshold"], 40.0);
    assert_eq!(body["data"]["enabled"], false);
    assert_eq!(body["data"]["url"], Value::Null);

    let (status, _) = app
        .send("DELETE", &format!("/api/alerts/{id}"), Some(&bob_key), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app
        .send("DELETE", &format!("/api/alerts/{id}"), Some(&alice_key), None)
        .await;
    assert_eq!(status, StatusCode::OK);
}
