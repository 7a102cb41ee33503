use crate::config::ScraperConfig;
use crate::error::AuditError;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

const SERVICE: &str = "scraping service";

/// Pass-through client for the scraping microservice.
#[derive(Clone)]
pub struct ScraperApi {
    client: reqwest::Client,
    endpoint: Url,
    timeout: Duration,
}

impl ScraperApi {
    pub fn new(client: reqwest::Client, cfg: &ScraperConfig) -> Result<Self, AuditError> {
        Ok(Self {
            client,
            endpoint: cfg.base_url.join("scrape")?,
            timeout: Duration::from_secs(cfg.timeout_secs),
        })
    }

    pub async fn scrape(&self, body: &Value) -> Result<Value, AuditError> {
        let resp = self
            .client
            .post(self.endpoint.clone())
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| AuditError::upstream(SERVICE, e))?;
        let status = resp.status();
        debug!(status = status.as_u16(), "scraper responded");
        let resp = resp
            .error_for_status()
            .map_err(|e| AuditError::upstream(SERVICE, e))?;
        resp.json().await.map_err(|e| AuditError::UpstreamPayload {
            service: SERVICE,
            detail: e.to_string(),
        })
    }
}
