use crate::config::PageSpeedConfig;
use crate::error::AuditError;
use crate::types::pagespeed::{PageSpeedReport, PsiResponse, Strategy};
use std::time::Duration;
use tracing::info;
use url::Url;

const SERVICE: &str = "PageSpeed Insights";

#[derive(Clone)]
pub struct PageSpeedApi {
    client: reqwest::Client,
    endpoint: Url,
    api_key: Option<String>,
    timeout: Duration,
}

impl PageSpeedApi {
    pub fn new(client: reqwest::Client, cfg: &PageSpeedConfig) -> Self {
        Self {
            client,
            endpoint: cfg.base_url.clone(),
            api_key: cfg.api_key.clone().filter(|k| !k.is_empty()),
            timeout: Duration::from_secs(cfg.timeout_secs),
        }
    }

    /// One `runPagespeed` call for the performance category, bounded by the timeout.
    pub async fn run(&self, url: &str, strategy: Strategy) -> Result<PageSpeedReport, AuditError> {
        let mut endpoint = self.endpoint.clone();
        {
            let mut query = endpoint.query_pairs_mut();
            query
                .append_pair("url", url)
                .append_pair("strategy", strategy.as_str())
                .append_pair("category", "performance");
            if let Some(key) = &self.api_key {
                query.append_pair("key", key);
            }
        }

        let resp = self
            .client
            .get(endpoint)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| AuditError::upstream(SERVICE, e))?
            .error_for_status()
            .map_err(|e| AuditError::upstream(SERVICE, e))?;

        let psi: PsiResponse = resp.json().await.map_err(|e| AuditError::UpstreamPayload {
            service: SERVICE,
            detail: e.to_string(),
        })?;
        let report = PageSpeedReport::from_psi(url, strategy, psi);
        info!(
            url,
            strategy = %strategy,
            score = report.performance_score.unwrap_or(-1.0),
            "PageSpeed run finished"
        );
        Ok(report)
    }
}
