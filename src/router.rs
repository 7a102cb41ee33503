use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::api::{GeminiApi, Mailer, PageSpeedApi, PaymentGateway, ScraperApi, SmtpMailer};
use crate::config::Config;
use crate::db::Storage;
use crate::error::AuditError;
use crate::handlers::{alerts, analysis, catalog, dashboard, email, payments, tools, users};
use crate::service::page_cache::{self, PageCacheHandle};

#[derive(Clone)]
pub struct AppState {
    pub storage: Storage,
    pub config: Arc<Config>,
    pub http: reqwest::Client,
    pub gemini: GeminiApi,
    pub pagespeed: PageSpeedApi,
    pub payments: PaymentGateway,
    pub scraper: ScraperApi,
    pub mailer: Option<Arc<dyn Mailer>>,
    pub cache: PageCacheHandle,
}

fn build_http_client(cfg: &Config) -> Result<reqwest::Client, AuditError> {
    let mut builder = reqwest::Client::builder()
        .user_agent(concat!("webaudit/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(5))
        .redirect(reqwest::redirect::Policy::limited(5));
    if let Some(proxy_url) = cfg.basic.proxy.as_ref() {
        builder = builder.proxy(reqwest::Proxy::all(proxy_url.as_str())?);
    }
    Ok(builder.build()?)
}

impl AppState {
    /// Build upstream clients from `cfg` and start the page-speed cache actor.
    pub async fn new(storage: Storage, cfg: Config) -> Result<Self, AuditError> {
        let http = build_http_client(&cfg)?;
        let mailer = SmtpMailer::from_config(&cfg.smtp)?.map(|m| Arc::new(m) as Arc<dyn Mailer>);
        let cache = page_cache::spawn(
            Duration::from_secs(cfg.pagespeed.cache_ttl_secs),
            cfg.pagespeed.cache_capacity,
        )
        .await?;

        let state = Self {
            gemini: GeminiApi::new(http.clone(), &cfg.gemini)?,
            pagespeed: PageSpeedApi::new(http.clone(), &cfg.pagespeed),
            payments: PaymentGateway::new(http.clone(), &cfg.payments),
            scraper: ScraperApi::new(http.clone(), &cfg.scraper)?,
            storage,
            config: Arc::new(cfg),
            http,
            mailer,
            cache,
        };
        info!(
            gemini = state.gemini.is_configured(),
            payments = state.payments.is_configured(),
            smtp = state.mailer.is_some(),
            "upstream clients ready"
        );
        Ok(state)
    }

    /// Replace the mail transport, e.g. with a recording one in tests.
    pub fn with_mailer(mut self, mailer: Option<Arc<dyn Mailer>>) -> Self {
        self.mailer = mailer;
        self
    }
}

pub fn audit_router(state: AppState) -> Router {
    let body_limit = state.config.basic.max_body_bytes;

    let api = Router::new()
        .route("/me", get(users::me))
        // alerts
        .route("/alerts", get(alerts::list).post(alerts::create))
        .route(
            "/alerts/{id}",
            get(alerts::get_one).put(alerts::update).delete(alerts::delete),
        )
        // catalog
        .route("/plans", get(catalog::list_active_plans))
        .route("/credit-packages", get(catalog::list_active_packages))
        // payments
        .route("/payments", get(payments::history))
        .route("/payments/orders", post(payments::create_order))
        .route("/payments/subscriptions", post(payments::create_subscription))
        .route("/payments/verify", post(payments::verify))
        .route("/payments/webhook", post(payments::webhook))
        // audits
        .route("/analyze/content", post(analysis::content))
        .route("/analyze/content/stream", post(analysis::content_stream))
        .route("/analyze/image", post(analysis::image))
        .route("/pagespeed", get(tools::pagespeed))
        .route("/link-check", post(tools::link_check))
        .route("/scrape", post(tools::scrape))
        // dashboard
        .route("/dashboard/summary", get(dashboard::summary))
        .route("/dashboard/charts", get(dashboard::charts))
        .route("/dashboard/activity", get(dashboard::activity));

    let admin = Router::new()
        .route("/plans", get(catalog::list_all_plans).post(catalog::create_plan))
        .route(
            "/plans/{id}",
            put(catalog::update_plan).delete(catalog::delete_plan),
        )
        .route(
            "/credit-packages",
            get(catalog::list_all_packages).post(catalog::create_package),
        )
        .route(
            "/credit-packages/{id}",
            put(catalog::update_package).delete(catalog::delete_package),
        )
        .route("/payments", get(payments::all_payments))
        .route("/email", post(email::send))
        .route("/stats", get(dashboard::admin_stats))
        .route("/users", get(users::list).post(users::create))
        .route("/users/{id}/credits", post(users::grant_credits));

    Router::new()
        .route("/health", get(users::health))
        .nest("/api", api.nest("/admin", admin))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
