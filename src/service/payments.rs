//! Gateway signature checks and the state changes payments cause.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use tracing::{info, warn};

use crate::db::Storage;
use crate::db::models::{Payment, PaymentKind, PaymentStatus};
use crate::error::AuditError;
use crate::types::payments::WebhookEvent;

type HmacSha256 = Hmac<Sha256>;

/// Lowercase hex HMAC-SHA256 of `payload`.
pub fn sign(secret: &str, payload: &[u8]) -> String {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return String::new();
    };
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a hex signature. An empty secret never verifies.
pub fn verify_signature(secret: &str, payload: &[u8], signature_hex: &str) -> bool {
    if secret.is_empty() {
        return false;
    }
    let Ok(expected) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

/// Message signed by the checkout widget: `"{order_id}|{payment_id}"`.
pub fn checkout_payload(order_id: &str, payment_id: &str) -> String {
    format!("{order_id}|{payment_id}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "detail")]
pub enum WebhookOutcome {
    Applied(String),
    Ignored(String),
}

/// Capture a checkout payment owned by `user_id`. Returns the refreshed row and
/// whether this call performed the capture.
pub async fn capture_checkout(
    storage: &Storage,
    user_id: i64,
    order_id: &str,
    payment_id: &str,
) -> Result<(Payment, bool), AuditError> {
    let payment = storage
        .find_payment_by_order(order_id)
        .await?
        .filter(|p| p.user_id == user_id)
        .ok_or(AuditError::NotFound("payment"))?;
    let captured = capture(storage, &payment, payment_id).await?;
    let refreshed = storage
        .find_payment_by_order(order_id)
        .await?
        .ok_or(AuditError::NotFound("payment"))?;
    Ok((refreshed, captured))
}

async fn capture(storage: &Storage, payment: &Payment, payment_id: &str) -> Result<bool, AuditError> {
    match payment.kind {
        PaymentKind::Credits => {
            let captured = storage.capture_credit_payment(payment, payment_id).await?;
            if captured {
                info!(
                    payment = payment.id,
                    user_id = payment.user_id,
                    credits = payment.credits,
                    "credit payment captured"
                );
            }
            Ok(captured)
        }
        PaymentKind::Subscription => {
            let already = payment.status == PaymentStatus::Captured;
            storage
                .set_payment_status(payment.id, PaymentStatus::Captured, Some(payment_id))
                .await?;
            Ok(!already)
        }
    }
}

pub async fn apply_webhook(
    storage: &Storage,
    event: WebhookEvent,
) -> Result<WebhookOutcome, AuditError> {
    let name = event.event.as_str();
    match name {
        "payment.captured" | "payment.failed" => {
            let Some(entity) = event.payload.payment.map(|w| w.entity) else {
                return Ok(WebhookOutcome::Ignored(format!("{name} without payment entity")));
            };
            let Some(order_id) = entity.order_id.as_deref() else {
                return Ok(WebhookOutcome::Ignored(format!("{name} without order id")));
            };
            let Some(payment) = storage.find_payment_by_order(order_id).await? else {
                warn!(order_id, event = name, "webhook for unknown order");
                return Ok(WebhookOutcome::Ignored(format!("unknown order {order_id}")));
            };
            if name == "payment.captured" {
                capture(storage, &payment, &entity.id).await?;
            } else if payment.status != PaymentStatus::Captured {
                storage
                    .set_payment_status(payment.id, PaymentStatus::Failed, Some(&entity.id))
                    .await?;
            }
            Ok(WebhookOutcome::Applied(name.to_string()))
        }
        "subscription.activated"
        | "subscription.charged"
        | "subscription.cancelled"
        | "subscription.halted"
        | "subscription.completed" => {
            let Some(sub) = event.payload.subscription.map(|w| w.entity) else {
                return Ok(WebhookOutcome::Ignored(format!(
                    "{name} without subscription entity"
                )));
            };
            let Some(payment) = storage.find_payment_by_subscription(&sub.id).await? else {
                warn!(subscription_id = %sub.id, event = name, "webhook for unknown subscription");
                return Ok(WebhookOutcome::Ignored(format!("unknown subscription {}", sub.id)));
            };
            let Some(plan_id) = payment.plan_id else {
                return Ok(WebhookOutcome::Ignored(format!(
                    "subscription {} has no plan",
                    sub.id
                )));
            };
            if matches!(name, "subscription.activated" | "subscription.charged") {
                let expires_at = sub
                    .current_end
                    .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0));
                let payment_id = event.payload.payment.as_ref().map(|w| w.entity.id.as_str());
                storage
                    .activate_subscription(&payment, payment_id, plan_id, expires_at)
                    .await?;
                info!(user_id = payment.user_id, plan_id, "subscription active");
            } else {
                let expired = storage.end_subscription(&payment, plan_id, Utc::now()).await?;
                info!(user_id = payment.user_id, plan_id, expired, "subscription ended");
            }
            Ok(WebhookOutcome::Applied(name.to_string()))
        }
        other => Ok(WebhookOutcome::Ignored(format!("unhandled event {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_matches_hmac_sha256_hex() {
        // RFC 4231 test case 2
        let sig = sign("Jefe", b"what do ya want for nothing?");
        assert_eq!(
            sig,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
        assert!(verify_signature("Jefe", b"what do ya want for nothing?", &sig));
    }

    #[test]
    fn tampered_or_malformed_signatures_fail() {
        let sig = sign("secret", b"order_1|pay_1");
        assert!(!verify_signature("secret", b"order_1|pay_2", &sig));
        assert!(!verify_signature("other", b"order_1|pay_1", &sig));
        assert!(!verify_signature("secret", b"order_1|pay_1", "zz-not-hex"));
        assert!(!verify_signature("", b"order_1|pay_1", &sign("", b"order_1|pay_1")));
    }

    #[test]
    fn checkout_payload_joins_with_pipe() {
        assert_eq!(checkout_payload("order_A", "pay_B"), "order_A|pay_B");
    }
}
