use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::text_enum::text_enum;

text_enum! {
    pub enum Strategy ("strategy") {
        Mobile => "mobile",
        Desktop => "desktop",
    }
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::Mobile
    }
}

/// Subset of the PageSpeed Insights v5 response we read.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PsiResponse {
    pub id: Option<String>,
    pub lighthouse_result: Option<LighthouseResult>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LighthouseResult {
    pub final_url: Option<String>,
    #[serde(default)]
    pub categories: HashMap<String, LighthouseCategory>,
    #[serde(default)]
    pub audits: HashMap<String, LighthouseAudit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LighthouseCategory {
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LighthouseAudit {
    pub numeric_value: Option<f64>,
    pub display_value: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LabMetrics {
    pub first_contentful_paint_ms: Option<f64>,
    pub largest_contentful_paint_ms: Option<f64>,
    pub cumulative_layout_shift: Option<f64>,
    pub total_blocking_time_ms: Option<f64>,
    pub speed_index_ms: Option<f64>,
    pub time_to_interactive_ms: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageSpeedReport {
    pub url: String,
    pub final_url: Option<String>,
    pub strategy: Strategy,
    /// Lighthouse performance category scaled to 0-100.
    pub performance_score: Option<f64>,
    pub metrics: LabMetrics,
    pub fetched_at: DateTime<Utc>,
}

impl PageSpeedReport {
    pub fn from_psi(url: &str, strategy: Strategy, resp: PsiResponse) -> Self {
        let lighthouse = resp.lighthouse_result;
        let audit = |key: &str| {
            lighthouse
                .as_ref()
                .and_then(|l| l.audits.get(key))
                .and_then(|a| a.numeric_value)
        };
        let metrics = LabMetrics {
            first_contentful_paint_ms: audit("first-contentful-paint"),
            largest_contentful_paint_ms: audit("largest-contentful-paint"),
            cumulative_layout_shift: audit("cumulative-layout-shift"),
            total_blocking_time_ms: audit("total-blocking-time"),
            speed_index_ms: audit("speed-index"),
            time_to_interactive_ms: audit("interactive"),
        };
        let performance_score = lighthouse
            .as_ref()
            .and_then(|l| l.categories.get("performance"))
            .and_then(|c| c.score)
            .map(|s| (s * 100.0).round());
        Self {
            url: url.to_string(),
            final_url: lighthouse.as_ref().and_then(|l| l.final_url.clone()),
            strategy,
            performance_score,
            metrics,
            fetched_at: Utc::now(),
        }
    }
}
