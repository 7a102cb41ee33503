//! Subscription plans and credit packages: public listings and admin CRUD.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::db::models::{BillingInterval, CreditPackage, FeatureList, Plan};
use crate::db::{CreditPackageDraft, PlanDraft};
use crate::error::AuditError;
use crate::handlers::{positive, required_text};
use crate::middleware::{AdminUser, JsonBody};
use crate::router::AppState;
use crate::service::access::Feature;
use crate::types::Envelope;

/// ISO 4217-style code: three ASCII letters, stored upper-case.
pub fn currency_code(value: &str) -> Result<String, AuditError> {
    let code = value.trim();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(AuditError::validation("currency must be a 3-letter code"));
    }
    Ok(code.to_ascii_uppercase())
}

#[derive(Debug, Deserialize)]
pub struct PlanRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: i64,
    pub currency: String,
    pub interval: BillingInterval,
    #[serde(default)]
    pub features: Vec<Feature>,
    pub audit_limit: Option<i64>,
    pub gateway_plan_id: Option<String>,
    #[serde(default = "active_by_default")]
    pub is_active: bool,
}

fn active_by_default() -> bool {
    true
}

impl PlanRequest {
    pub fn into_draft(self) -> Result<PlanDraft, AuditError> {
        let mut features = self.features;
        features.sort_by_key(|f| f.as_str());
        features.dedup();
        Ok(PlanDraft {
            name: required_text("name", &self.name)?,
            description: self.description.trim().to_string(),
            price: positive("price", self.price)?,
            currency: currency_code(&self.currency)?,
            interval: self.interval,
            features: FeatureList(features),
            audit_limit: self
                .audit_limit
                .map(|l| positive("audit_limit", l))
                .transpose()?,
            gateway_plan_id: self
                .gateway_plan_id
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty()),
            is_active: self.is_active,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CreditPackageRequest {
    pub name: String,
    pub credits: i64,
    pub price: i64,
    pub currency: String,
    #[serde(default = "active_by_default")]
    pub is_active: bool,
}

impl CreditPackageRequest {
    pub fn into_draft(self) -> Result<CreditPackageDraft, AuditError> {
        Ok(CreditPackageDraft {
            name: required_text("name", &self.name)?,
            credits: positive("credits", self.credits)?,
            price: positive("price", self.price)?,
            currency: currency_code(&self.currency)?,
            is_active: self.is_active,
        })
    }
}

pub async fn list_active_plans(
    State(state): State<AppState>,
) -> Result<Json<Envelope<Vec<Plan>>>, AuditError> {
    Ok(Envelope::ok(state.storage.list_plans(true).await?))
}

pub async fn list_all_plans(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> Result<Json<Envelope<Vec<Plan>>>, AuditError> {
    Ok(Envelope::ok(state.storage.list_plans(false).await?))
}

pub async fn create_plan(
    _admin: AdminUser,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<PlanRequest>,
) -> Result<impl IntoResponse, AuditError> {
    let plan = state.storage.create_plan(&req.into_draft()?).await?;
    info!(plan_id = plan.id, name = %plan.name, "plan created");
    Ok((StatusCode::CREATED, Envelope::ok(plan)))
}

pub async fn update_plan(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    JsonBody(req): JsonBody<PlanRequest>,
) -> Result<Json<Envelope<Plan>>, AuditError> {
    let plan = state.storage.update_plan(id, &req.into_draft()?).await?;
    info!(plan_id = id, "plan updated");
    Ok(Envelope::ok(plan))
}

pub async fn delete_plan(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AuditError> {
    state.storage.delete_plan(id).await?;
    info!(plan_id = id, "plan deleted");
    Ok(Envelope::ok(json!({ "deleted": id })))
}

pub async fn list_active_packages(
    State(state): State<AppState>,
) -> Result<Json<Envelope<Vec<CreditPackage>>>, AuditError> {
    Ok(Envelope::ok(state.storage.list_credit_packages(true).await?))
}

pub async fn list_all_packages(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> Result<Json<Envelope<Vec<CreditPackage>>>, AuditError> {
    Ok(Envelope::ok(state.storage.list_credit_packages(false).await?))
}

pub async fn create_package(
    _admin: AdminUser,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<CreditPackageRequest>,
) -> Result<impl IntoResponse, AuditError> {
    let package = state
        .storage
        .create_credit_package(&req.into_draft()?)
        .await?;
    info!(package_id = package.id, credits = package.credits, "credit package created");
    Ok((StatusCode::CREATED, Envelope::ok(package)))
}

pub async fn update_package(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    JsonBody(req): JsonBody<CreditPackageRequest>,
) -> Result<Json<Envelope<CreditPackage>>, AuditError> {
    let package = state
        .storage
        .update_credit_package(id, &req.into_draft()?)
        .await?;
    Ok(Envelope::ok(package))
}

pub async fn delete_package(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AuditError> {
    state.storage.delete_credit_package(id).await?;
    info!(package_id = id, "credit package deleted");
    Ok(Envelope::ok(json!({ "deleted": id })))
}
