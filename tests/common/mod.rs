#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use httpmock::MockServer;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower::ServiceExt;
use url::Url;

use webaudit::api::{Mailer, OutgoingEmail};
use webaudit::config::Config;
use webaudit::db::Storage;
use webaudit::db::models::{Role, User};
use webaudit::service::api_keys::{generate_api_key, hash_api_key};
use webaudit::{AppState, AuditError, audit_router};

pub const ADMIN_KEY: &str = "admin-secret";
pub const KEY_SECRET: &str = "rzp_secret";
pub const WEBHOOK_SECRET: &str = "whsec_test";

/// Mail sink that keeps every message for later assertions.
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<OutgoingEmail>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Wait for background sends until `count` messages arrived or a second passed.
    pub async fn wait_for(&self, count: usize) -> Vec<OutgoingEmail> {
        for _ in 0..100 {
            let sent = self.sent();
            if sent.len() >= count {
                return sent;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        self.sent()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), AuditError> {
        self.sent.lock().expect("mailer lock poisoned").push(email);
        Ok(())
    }
}

/// Config with every upstream pointed at `mock`.
pub fn test_config(mock: &MockServer) -> Config {
    let base = Url::parse(&mock.base_url()).expect("mock base url");
    let mut cfg = Config::default();
    cfg.basic.admin_key = ADMIN_KEY.to_string();
    cfg.gemini.api_key = "gemini-test-key".to_string();
    cfg.gemini.base_url = base.clone();
    cfg.gemini.timeout_secs = 5;
    cfg.gemini.progress_interval_ms = 20;
    cfg.pagespeed.base_url = base
        .join("pagespeedonline/v5/runPagespeed")
        .expect("pagespeed url");
    cfg.pagespeed.timeout_secs = 5;
    cfg.payments.base_url = base.clone();
    cfg.payments.key_id = "rzp_test_key".to_string();
    cfg.payments.key_secret = KEY_SECRET.to_string();
    cfg.payments.webhook_secret = WEBHOOK_SECRET.to_string();
    cfg.scraper.base_url = base;
    cfg.scraper.timeout_secs = 5;
    cfg.link_check.timeout_secs = 5;
    cfg.smtp.host = None;
    cfg
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub mailer: Arc<RecordingMailer>,
    _dir: TempDir,
}

pub async fn spawn_app(cfg: Config) -> TestApp {
    spawn_app_with_mailer(cfg, true).await
}

pub async fn spawn_app_with_mailer(cfg: Config, with_mailer: bool) -> TestApp {
    let dir = tempfile::tempdir().expect("tempdir");
    let database_url = format!("sqlite:{}", dir.path().join("audit.sqlite").display());
    let storage = Storage::connect(&database_url).await.expect("open database");
    let mailer = Arc::new(RecordingMailer::default());
    let state = AppState::new(storage, cfg)
        .await
        .expect("build state")
        .with_mailer(with_mailer.then(|| mailer.clone() as Arc<dyn Mailer>));
    TestApp {
        router: audit_router(state.clone()),
        state,
        mailer,
        _dir: dir,
    }
}

impl TestApp {
    /// Insert a user directly and return it with its plaintext key.
    pub async fn user(&self, email: &str, role: Role) -> (User, String) {
        let key = generate_api_key();
        let user = self
            .state
            .storage
            .create_user(email, None, role, &hash_api_key(&key))
            .await
            .expect("create user");
        (user, key)
    }

    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        key: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(key) = key {
            builder = builder.header("authorization", format!("Bearer {key}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let resp = self
            .router
            .clone()
            .oneshot(builder.body(body).expect("build request"))
            .await
            .expect("request failed");
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX)
            .await
            .expect("read body");
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    pub async fn get(&self, uri: &str, key: &str) -> (StatusCode, Value) {
        self.send("GET", uri, Some(key), None).await
    }

    pub async fn post(&self, uri: &str, key: &str, body: Value) -> (StatusCode, Value) {
        self.send("POST", uri, Some(key), Some(body)).await
    }
}

/// Gemini `generateContent` reply carrying `text` as the only part.
pub fn gemini_reply(text: &str) -> Value {
    serde_json::json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": "STOP"
        }],
        "modelVersion": "gemini-2.0-flash"
    })
}
