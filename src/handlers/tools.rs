//! Page speed, link checking and the scrape proxy.

use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{info, warn};

use crate::db::models::{AlertMetric, AuditKind, NewLinkResult};
use crate::error::AuditError;
use crate::middleware::{AuthUser, JsonBody};
use crate::router::AppState;
use crate::service::access::{self, Feature};
use crate::service::link_checker::{self, LinkStatus};
use crate::service::{alert_eval, pages};
use crate::types::Envelope;
use crate::types::pagespeed::{PageSpeedReport, Strategy};

const PAGE_FETCH_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Deserialize)]
pub struct PageSpeedQuery {
    pub url: String,
    #[serde(default)]
    pub strategy: Strategy,
}

#[derive(Debug, Serialize)]
pub struct PageSpeedResponse {
    #[serde(flatten)]
    pub report: PageSpeedReport,
    pub cached: bool,
    pub triggered_alerts: Vec<i64>,
}

pub async fn pagespeed(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<PageSpeedQuery>,
) -> Result<Json<Envelope<PageSpeedResponse>>, AuditError> {
    let url = pages::parse_http_url(&query.url)?.to_string();
    access::authorize(&state, &user, Feature::PageSpeed).await?;

    if let Some(report) = state.cache.get(&url, query.strategy).await {
        return Ok(Envelope::ok(PageSpeedResponse {
            report,
            cached: true,
            triggered_alerts: Vec::new(),
        }));
    }

    let report = state.pagespeed.run(&url, query.strategy).await?;
    state.cache.put(report.clone());

    let summary = json!({ "strategy": report.strategy, "metrics": report.metrics });
    if let Err(e) = state
        .storage
        .record_audit(user.id, &url, AuditKind::PageSpeed, report.performance_score, &summary)
        .await
    {
        warn!(user_id = user.id, error = %e, "recording page speed audit failed");
    }
    let triggered_alerts = match report.performance_score {
        Some(score) => {
            alert_eval::evaluate(&state, &user, &url, AlertMetric::PerformanceScore, score).await
        }
        None => Vec::new(),
    };

    Ok(Envelope::ok(PageSpeedResponse {
        report,
        cached: false,
        triggered_alerts,
    }))
}

#[derive(Debug, Deserialize)]
pub struct LinkCheckRequest {
    pub url: String,
    pub max_links: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct LinkCheckResponse {
    pub url: String,
    pub checked: usize,
    pub broken: usize,
    pub links: Vec<LinkStatus>,
    pub audit_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_warning: Option<String>,
    pub triggered_alerts: Vec<i64>,
}

pub async fn link_check(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    JsonBody(req): JsonBody<LinkCheckRequest>,
) -> Result<Json<Envelope<LinkCheckResponse>>, AuditError> {
    let url = pages::parse_http_url(&req.url)?;
    if req.max_links == Some(0) {
        return Err(AuditError::validation("max_links must be greater than 0"));
    }
    access::authorize(&state, &user, Feature::LinkCheck).await?;

    let cfg = &state.config.link_check;
    let cap = req.max_links.unwrap_or(cfg.max_links).min(cfg.max_links);
    let html = pages::fetch_html(
        &state.http,
        &url,
        PAGE_FETCH_TIMEOUT,
        state.config.basic.max_page_bytes,
    )
    .await?;
    let targets = pages::extract_links(&html, &url, cap);
    let links = link_checker::check_links(
        &state.http,
        targets,
        cfg.concurrency,
        Duration::from_secs(cfg.timeout_secs),
    )
    .await;

    let broken: Vec<NewLinkResult> = links.iter().filter(|l| !l.ok).map(LinkStatus::to_row).collect();
    info!(url = %url, checked = links.len(), broken = broken.len(), "link check finished");

    let score = if links.is_empty() {
        None
    } else {
        Some(100.0 * (links.len() - broken.len()) as f64 / links.len() as f64)
    };
    let summary = json!({ "checked": links.len(), "broken": broken.len() });
    let mut storage_warning = None;
    let audit_id = match state
        .storage
        .record_audit(user.id, url.as_str(), AuditKind::Links, score, &summary)
        .await
    {
        Ok(audit) => {
            let outcome = state.storage.insert_link_results(audit.id, &broken).await;
            if outcome.failed > 0 {
                storage_warning = Some(format!(
                    "{} of {} broken links were not stored: {}",
                    outcome.failed,
                    broken.len(),
                    outcome.last_error.unwrap_or_default()
                ));
            }
            Some(audit.id)
        }
        Err(e) => {
            warn!(user_id = user.id, error = %e, "recording link audit failed");
            storage_warning = Some("link check results were not stored".to_string());
            None
        }
    };

    let triggered_alerts = alert_eval::evaluate(
        &state,
        &user,
        url.as_str(),
        AlertMetric::BrokenLinks,
        broken.len() as f64,
    )
    .await;

    Ok(Envelope::ok(LinkCheckResponse {
        url: url.to_string(),
        checked: links.len(),
        broken: broken.len(),
        links,
        audit_id,
        storage_warning,
        triggered_alerts,
    }))
}

pub async fn scrape(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    JsonBody(body): JsonBody<Value>,
) -> Result<Json<Envelope<Value>>, AuditError> {
    let target = body
        .get("url")
        .and_then(Value::as_str)
        .ok_or_else(|| AuditError::validation("url is required"))?;
    let url = pages::parse_http_url(target)?;
    let grant = access::authorize(&state, &user, Feature::Scrape).await?;

    let outcome = state.scraper.scrape(&body).await;
    let data = access::refund_on_error(&state, &user, grant, outcome).await?;
    if let Err(e) = state
        .storage
        .record_audit(user.id, url.as_str(), AuditKind::Scrape, None, &json!({}))
        .await
    {
        warn!(user_id = user.id, error = %e, "recording scrape audit failed");
    }
    Ok(Envelope::ok(data))
}
