use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::Error as SqlxError;
use std::collections::HashMap;
use thiserror::Error as ThisError;
use tracing::{error, warn};

#[derive(Debug, ThisError)]
pub enum AuditError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("missing or invalid API key")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("plan does not include feature `{0}`")]
    PlanAccessDenied(String),

    #[error("monthly audit quota of {0} reached")]
    QuotaExceeded(i64),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("request body too large")]
    PayloadTooLarge,

    #[error("{0} is unavailable")]
    UpstreamUnavailable(&'static str),

    #[error("{service} responded with status {status}")]
    UpstreamStatus {
        service: &'static str,
        status: StatusCode,
    },

    #[error("{service} returned an unexpected payload: {detail}")]
    UpstreamPayload {
        service: &'static str,
        detail: String,
    },

    #[error("Gemini API error: {0:?}")]
    GeminiServerError(GeminiError),

    #[error("email delivery is not configured")]
    EmailNotConfigured,

    #[error("email delivery failed: {0}")]
    Email(String),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] SqlxError),

    #[error("Actor error: {0}")]
    RactorError(String),
}

impl AuditError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Classify a transport failure against a named upstream.
    pub fn upstream(service: &'static str, err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            return Self::UpstreamUnavailable(service);
        }
        if let Some(status) = err.status() {
            return Self::UpstreamStatus { service, status };
        }
        Self::Reqwest(err)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::UrlParse(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) | Self::PlanAccessDenied(_) | Self::QuotaExceeded(_) => {
                StatusCode::FORBIDDEN
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::UpstreamUnavailable(_) | Self::EmailNotConfigured => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::UpstreamStatus { status, .. }
                if *status == StatusCode::TOO_MANY_REQUESTS
                    || *status == StatusCode::SERVICE_UNAVAILABLE =>
            {
                *status
            }
            Self::GeminiServerError(gemini_err) => gemini_status(gemini_err.error.code),
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Error envelope body; internal failures get a generic message.
    pub fn body(&self) -> ApiErrorBody {
        let (code, message) = match self {
            Self::Validation(msg) => ("INVALID_REQUEST", msg.clone()),
            Self::UrlParse(e) => ("INVALID_REQUEST", format!("invalid url: {e}")),
            Self::Unauthorized => ("UNAUTHORIZED", self.to_string()),
            Self::Forbidden(_) => ("FORBIDDEN", self.to_string()),
            Self::PlanAccessDenied(_) => ("PLAN_ACCESS_DENIED", self.to_string()),
            Self::QuotaExceeded(_) => ("QUOTA_EXCEEDED", self.to_string()),
            Self::NotFound(_) => ("NOT_FOUND", self.to_string()),
            Self::Conflict(_) => ("CONFLICT", self.to_string()),
            Self::PayloadTooLarge => ("PAYLOAD_TOO_LARGE", self.to_string()),
            Self::UpstreamUnavailable(_) => ("UPSTREAM_UNAVAILABLE", self.to_string()),
            Self::EmailNotConfigured => ("EMAIL_NOT_CONFIGURED", self.to_string()),
            Self::UpstreamStatus { service, status } => {
                if *status == StatusCode::TOO_MANY_REQUESTS {
                    ("RATE_LIMIT", format!("{service} rate limit exceeded."))
                } else if *status == StatusCode::SERVICE_UNAVAILABLE {
                    ("UPSTREAM_UNAVAILABLE", format!("{service} is unavailable"))
                } else {
                    ("UPSTREAM_ERROR", self.to_string())
                }
            }
            Self::UpstreamPayload { service, .. } => (
                "UPSTREAM_ERROR",
                format!("{service} returned an unexpected payload."),
            ),
            Self::GeminiServerError(gemini_err) => {
                return ApiErrorBody {
                    code: gemini_err.error.status.clone(),
                    message: gemini_err.error.message.clone(),
                };
            }
            Self::Email(_) => ("EMAIL_FAILED", "Email delivery failed.".to_string()),
            Self::Reqwest(_) => ("UPSTREAM_ERROR", "Upstream request failed.".to_string()),
            Self::Json(_) | Self::DatabaseError(_) | Self::RactorError(_) => (
                "INTERNAL_ERROR",
                "An internal server error occurred.".to_string(),
            ),
        };
        ApiErrorBody {
            code: code.to_string(),
            message,
        }
    }
}

/// Status for a Gemini error body; codes that are not HTTP error statuses become 500.
fn gemini_status(code: u32) -> StatusCode {
    u16::try_from(code)
        .ok()
        .and_then(|c| StatusCode::from_u16(c).ok())
        .filter(|s| s.is_client_error() || s.is_server_error())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

impl IntoResponse for AuditError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "request failed");
        } else {
            warn!(status = status.as_u16(), error = %self, "request rejected");
        }
        (status, Json(ApiErrorResponse { error: self.body() })).into_response()
    }
}

/// Standardized API error response body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
}

/// Gemini API error response structure
#[derive(Deserialize, Debug)]
pub struct GeminiError {
    pub error: GeminiErrorBody,
}

#[derive(Deserialize, Debug)]
pub struct GeminiErrorBody {
    pub code: u32,
    pub message: String,
    pub status: String,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}
