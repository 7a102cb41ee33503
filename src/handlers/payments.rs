use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use tracing::{info, warn};

use crate::db::NewPayment;
use crate::db::models::{Payment, PaymentKind};
use crate::error::AuditError;
use crate::middleware::{AdminUser, AuthUser, JsonBody, RawBody};
use crate::router::AppState;
use crate::service::payments::{self, WebhookOutcome};
use crate::types::Envelope;
use crate::types::payments::{CreateOrderRequest, CreateSubscriptionRequest, WebhookEvent};

pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";

fn notes(user_id: i64, extra: (&str, i64)) -> HashMap<String, String> {
    HashMap::from([
        ("user_id".to_string(), user_id.to_string()),
        (extra.0.to_string(), extra.1.to_string()),
    ])
}

#[derive(Debug, Deserialize)]
pub struct CreateOrder {
    pub credit_package_id: i64,
}

#[derive(Debug, Serialize)]
pub struct CheckoutOrder {
    pub payment_id: i64,
    pub order_id: String,
    pub amount: i64,
    pub currency: String,
    pub credits: i64,
    pub key_id: String,
}

pub async fn create_order(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    JsonBody(req): JsonBody<CreateOrder>,
) -> Result<impl IntoResponse, AuditError> {
    let package = state.storage.get_credit_package(req.credit_package_id).await?;
    if !package.is_active {
        return Err(AuditError::validation("credit package is not available"));
    }

    let order = state
        .payments
        .create_order(&CreateOrderRequest {
            amount: package.price,
            currency: package.currency.clone(),
            receipt: format!("u{}-p{}-{}", user.id, package.id, chrono::Utc::now().timestamp()),
            notes: notes(user.id, ("credit_package_id", package.id)),
        })
        .await?;

    let payment = state
        .storage
        .create_payment(&NewPayment {
            user_id: user.id,
            kind: PaymentKind::Credits,
            gateway_order_id: Some(order.id.clone()),
            gateway_subscription_id: None,
            amount: package.price,
            currency: package.currency.clone(),
            credits: package.credits,
            credit_package_id: Some(package.id),
            plan_id: None,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Envelope::ok(CheckoutOrder {
            payment_id: payment.id,
            order_id: order.id,
            amount: payment.amount,
            currency: payment.currency,
            credits: payment.credits,
            key_id: state.payments.key_id().to_string(),
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct CreateSubscription {
    pub plan_id: i64,
}

#[derive(Debug, Serialize)]
pub struct CheckoutSubscription {
    pub payment_id: i64,
    pub subscription_id: String,
    pub short_url: Option<String>,
    pub key_id: String,
}

pub async fn create_subscription(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    JsonBody(req): JsonBody<CreateSubscription>,
) -> Result<impl IntoResponse, AuditError> {
    let plan = state.storage.get_plan(req.plan_id).await?;
    if !plan.is_active {
        return Err(AuditError::validation("plan is not available"));
    }
    let Some(gateway_plan_id) = plan.gateway_plan_id.clone() else {
        return Err(AuditError::validation("plan cannot be purchased online"));
    };

    let sub = state
        .payments
        .create_subscription(&CreateSubscriptionRequest {
            plan_id: gateway_plan_id,
            total_count: state.config.payments.subscription_total_count,
            customer_notify: 1,
            notes: notes(user.id, ("plan_id", plan.id)),
        })
        .await?;

    let payment = state
        .storage
        .create_payment(&NewPayment {
            user_id: user.id,
            kind: PaymentKind::Subscription,
            gateway_order_id: None,
            gateway_subscription_id: Some(sub.id.clone()),
            amount: plan.price,
            currency: plan.currency.clone(),
            credits: 0,
            credit_package_id: None,
            plan_id: Some(plan.id),
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Envelope::ok(CheckoutSubscription {
            payment_id: payment.id,
            subscription_id: sub.id,
            short_url: sub.short_url,
            key_id: state.payments.key_id().to_string(),
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct VerifyPayment {
    pub order_id: String,
    pub payment_id: String,
    pub signature: String,
}

pub async fn verify(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    JsonBody(req): JsonBody<VerifyPayment>,
) -> Result<impl IntoResponse, AuditError> {
    let payload = payments::checkout_payload(&req.order_id, &req.payment_id);
    if !payments::verify_signature(
        &state.config.payments.key_secret,
        payload.as_bytes(),
        &req.signature,
    ) {
        warn!(user_id = user.id, order_id = %req.order_id, "checkout signature mismatch");
        return Err(AuditError::validation("payment signature mismatch"));
    }

    let (payment, captured) =
        payments::capture_checkout(&state.storage, user.id, &req.order_id, &req.payment_id).await?;
    let user = state.storage.get_user(user.id).await?;
    Ok(Envelope::ok(json!({
        "payment": payment,
        "newly_captured": captured,
        "credits": user.credits,
    })))
}

pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    RawBody(body): RawBody,
) -> Result<impl IntoResponse, AuditError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !payments::verify_signature(&state.config.payments.webhook_secret, &body, signature) {
        warn!("webhook signature mismatch");
        return Err(AuditError::validation("webhook signature mismatch"));
    }

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| AuditError::validation(format!("malformed webhook payload: {e}")))?;
    let outcome = payments::apply_webhook(&state.storage, event).await?;
    let body = match outcome {
        WebhookOutcome::Applied(event) => {
            info!(event = %event, "webhook applied");
            json!({ "success": true, "data": { "event": event } })
        }
        WebhookOutcome::Ignored(reason) => {
            info!(reason = %reason, "webhook ignored");
            json!({ "success": true, "ignored": true, "reason": reason })
        }
    };
    Ok(Json(body))
}

pub async fn history(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Envelope<Vec<Payment>>>, AuditError> {
    Ok(Envelope::ok(state.storage.list_payments(user.id).await?))
}

pub async fn all_payments(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> Result<Json<Envelope<Vec<Payment>>>, AuditError> {
    Ok(Envelope::ok(state.storage.list_all_payments().await?))
}
