use crate::config::PaymentsConfig;
use crate::error::AuditError;
use crate::types::payments::{
    CreateOrderRequest, CreateSubscriptionRequest, GatewayOrder, GatewaySubscription,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::info;
use url::Url;

const SERVICE: &str = "payment gateway";

/// Orders and subscriptions against a Razorpay-compatible REST API.
#[derive(Clone)]
pub struct PaymentGateway {
    client: reqwest::Client,
    base_url: Url,
    key_id: String,
    key_secret: String,
    timeout: Duration,
}

impl PaymentGateway {
    pub fn new(client: reqwest::Client, cfg: &PaymentsConfig) -> Self {
        Self {
            client,
            base_url: cfg.base_url.clone(),
            key_id: cfg.key_id.clone(),
            key_secret: cfg.key_secret.clone(),
            timeout: Duration::from_secs(cfg.timeout_secs),
        }
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn is_configured(&self) -> bool {
        !self.key_id.is_empty() && !self.key_secret.is_empty()
    }

    pub async fn create_order(&self, req: &CreateOrderRequest) -> Result<GatewayOrder, AuditError> {
        let order: GatewayOrder = self.post("v1/orders", req).await?;
        info!(order_id = %order.id, amount = order.amount, currency = %order.currency, "gateway order created");
        Ok(order)
    }

    pub async fn create_subscription(
        &self,
        req: &CreateSubscriptionRequest,
    ) -> Result<GatewaySubscription, AuditError> {
        let sub: GatewaySubscription = self.post("v1/subscriptions", req).await?;
        info!(subscription_id = %sub.id, plan_id = %req.plan_id, "gateway subscription created");
        Ok(sub)
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, AuditError>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        if !self.is_configured() {
            return Err(AuditError::UpstreamUnavailable(SERVICE));
        }
        let url = self.base_url.join(path)?;
        let resp = self
            .client
            .post(url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| AuditError::upstream(SERVICE, e))?
            .error_for_status()
            .map_err(|e| AuditError::upstream(SERVICE, e))?;
        resp.json().await.map_err(|e| AuditError::UpstreamPayload {
            service: SERVICE,
            detail: e.to_string(),
        })
    }
}
