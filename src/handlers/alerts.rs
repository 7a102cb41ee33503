use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;

use crate::db::AlertDraft;
use crate::db::models::{Alert, AlertMetric, Comparison, User};
use crate::error::AuditError;
use crate::handlers::required_text;
use crate::middleware::{AuthUser, JsonBody};
use crate::router::AppState;
use crate::service::access::{self, Feature};
use crate::service::pages::parse_http_url;
use crate::types::Envelope;

#[derive(Debug, Deserialize)]
pub struct AlertRequest {
    pub name: String,
    pub url: Option<String>,
    pub metric: AlertMetric,
    pub comparison: Comparison,
    pub threshold: f64,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl AlertRequest {
    pub fn into_draft(self) -> Result<AlertDraft, AuditError> {
        let name = required_text("name", &self.name)?;
        let url = self
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(|u| parse_http_url(u).map(|u| u.to_string()))
            .transpose()?;

        if !self.threshold.is_finite() {
            return Err(AuditError::validation("threshold must be a finite number"));
        }
        let in_range = match self.metric {
            AlertMetric::PerformanceScore | AlertMetric::ContentScore => {
                (0.0..=100.0).contains(&self.threshold)
            }
            AlertMetric::BrokenLinks => self.threshold >= 0.0,
        };
        if !in_range {
            return Err(AuditError::validation(format!(
                "threshold {} is out of range for {}",
                self.threshold, self.metric
            )));
        }

        Ok(AlertDraft {
            name,
            url,
            metric: self.metric,
            comparison: self.comparison,
            threshold: self.threshold,
            enabled: self.enabled,
        })
    }
}

async fn gate(state: &AppState, user: &User) -> Result<(), AuditError> {
    access::authorize(state, user, Feature::Alerts).await.map(|_| ())
}

pub async fn list(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Envelope<Vec<Alert>>>, AuditError> {
    gate(&state, &user).await?;
    Ok(Envelope::ok(state.storage.list_alerts(user.id).await?))
}

pub async fn get_one(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Envelope<Alert>>, AuditError> {
    gate(&state, &user).await?;
    Ok(Envelope::ok(state.storage.get_alert(user.id, id).await?))
}

pub async fn create(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    JsonBody(req): JsonBody<AlertRequest>,
) -> Result<impl IntoResponse, AuditError> {
    let draft = req.into_draft()?;
    gate(&state, &user).await?;
    let alert = state.storage.create_alert(user.id, &draft).await?;
    Ok((StatusCode::CREATED, Envelope::ok(alert)))
}

pub async fn update(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
    JsonBody(req): JsonBody<AlertRequest>,
) -> Result<Json<Envelope<Alert>>, AuditError> {
    let draft = req.into_draft()?;
    gate(&state, &user).await?;
    Ok(Envelope::ok(state.storage.update_alert(user.id, id, &draft).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AuditError> {
    gate(&state, &user).await?;
    state.storage.delete_alert(user.id, id).await?;
    Ok(Envelope::ok(json!({ "deleted": id })))
}
