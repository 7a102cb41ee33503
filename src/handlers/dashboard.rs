use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;

use crate::error::AuditError;
use crate::middleware::{AdminUser, AuthUser};
use crate::router::AppState;
use crate::service::dashboard::{
    self, ActivityItem, AdminStats, ChartBucket, DEFAULT_ACTIVITY_LIMIT, DEFAULT_CHART_DAYS,
    MAX_ACTIVITY_LIMIT, MAX_CHART_DAYS, Summary,
};
use crate::types::Envelope;

pub async fn summary(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Envelope<Summary>>, AuditError> {
    Ok(Envelope::ok(dashboard::summary(&state, &user).await?))
}

#[derive(Debug, Deserialize)]
pub struct ChartQuery {
    pub days: Option<i64>,
}

pub async fn charts(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<ChartQuery>,
) -> Result<Json<Envelope<Vec<ChartBucket>>>, AuditError> {
    let days = dashboard::bounded("days", query.days, DEFAULT_CHART_DAYS, MAX_CHART_DAYS)?;
    Ok(Envelope::ok(dashboard::charts(&state, &user, days).await?))
}

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<i64>,
}

pub async fn activity(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<Envelope<Vec<ActivityItem>>>, AuditError> {
    let limit = dashboard::bounded(
        "limit",
        query.limit,
        DEFAULT_ACTIVITY_LIMIT,
        MAX_ACTIVITY_LIMIT,
    )?;
    Ok(Envelope::ok(dashboard::activity(&state, &user, limit).await?))
}

pub async fn admin_stats(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> Result<Json<Envelope<AdminStats>>, AuditError> {
    Ok(Envelope::ok(dashboard::admin_stats(&state).await?))
}
