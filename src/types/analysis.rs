use serde::{Deserialize, Serialize};

/// Model verdict on a page's written content.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ContentAnalysis {
    /// 0-100.
    pub score: Option<f64>,
    pub summary: String,
    pub readability: Option<String>,
    pub seo_issues: Vec<String>,
    pub suggestions: Vec<String>,
    pub keywords: Vec<String>,
}

/// Model verdict on a single image.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ImageAnalysis {
    /// 0-100.
    pub score: Option<f64>,
    pub description: String,
    pub alt_text: Option<String>,
    pub issues: Vec<String>,
}
