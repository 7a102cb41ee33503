use crate::config::GeminiConfig;
use crate::error::{AuditError, GeminiError};
use crate::types::gemini::{GenerateContentRequest, GenerateContentResponse};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};
use url::Url;

const SERVICE: &str = "Gemini API";

/// Stateless `generateContent` caller with a process-wide outbound rate limit.
#[derive(Clone)]
pub struct GeminiApi {
    client: reqwest::Client,
    endpoint: Url,
    api_key: String,
    timeout: Duration,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl GeminiApi {
    pub fn new(client: reqwest::Client, cfg: &GeminiConfig) -> Result<Self, AuditError> {
        let endpoint = cfg
            .base_url
            .join(&format!("v1beta/models/{}:generateContent", cfg.model))?;
        let per_minute = NonZeroU32::new(cfg.requests_per_minute.max(1)).unwrap_or(NonZeroU32::MIN);
        Ok(Self {
            client,
            endpoint,
            api_key: cfg.api_key.clone(),
            timeout: Duration::from_secs(cfg.timeout_secs),
            limiter: Arc::new(RateLimiter::direct(Quota::per_minute(per_minute))),
        })
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    pub async fn generate(
        &self,
        body: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, AuditError> {
        if !self.is_configured() {
            return Err(AuditError::UpstreamUnavailable(SERVICE));
        }
        self.limiter.until_ready().await;

        let resp = self
            .client
            .post(self.endpoint.clone())
            .header("x-goog-api-key", &self.api_key)
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| AuditError::upstream(SERVICE, e))?;

        let status = resp.status();
        if !status.is_success() {
            let bytes = resp.bytes().await.unwrap_or_default();
            error!(status = status.as_u16(), "Gemini API returned an error");
            return Err(match serde_json::from_slice::<GeminiError>(&bytes) {
                Ok(gemini_err) => AuditError::GeminiServerError(gemini_err),
                Err(_) => AuditError::UpstreamStatus {
                    service: SERVICE,
                    status,
                },
            });
        }

        let parsed: GenerateContentResponse =
            resp.json().await.map_err(|e| AuditError::UpstreamPayload {
                service: SERVICE,
                detail: e.to_string(),
            })?;
        debug!(
            model_version = parsed.model_version.as_deref().unwrap_or("-"),
            candidates = parsed.candidates.len(),
            "Gemini response received"
        );
        Ok(parsed)
    }
}
