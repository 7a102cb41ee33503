//! Prompt building and response shaping for the AI content and image analyses.

use base64::Engine;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::db::models::{AlertMetric, AuditKind, User};
use crate::error::AuditError;
use crate::router::AppState;
use crate::service::{alert_eval, pages};
use crate::types::analysis::{ContentAnalysis, ImageAnalysis};
use crate::types::gemini::{GenerateContentRequest, Part};

const MAX_KEYWORDS: usize = 20;
const PAGE_FETCH_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, Deserialize)]
pub struct ContentRequest {
    pub url: Option<String>,
    pub content: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageRequest {
    pub image_url: String,
    pub alt_text: Option<String>,
}

/// Validated content-analysis input with the page text already resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedContent {
    /// Audited URL, or `inline` for pasted text.
    pub source: String,
    pub text: String,
    pub keywords: Vec<String>,
}

fn clean_keywords(keywords: Vec<String>) -> Result<Vec<String>, AuditError> {
    let keywords: Vec<String> = keywords
        .into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect();
    if keywords.len() > MAX_KEYWORDS {
        return Err(AuditError::validation(format!(
            "at most {MAX_KEYWORDS} keywords are allowed"
        )));
    }
    Ok(keywords)
}

/// Where the text to analyse comes from, after validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentSource {
    Inline { url: Option<Url>, text: String },
    Page(Url),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContentInput {
    pub source: ContentSource,
    pub keywords: Vec<String>,
}

/// Check the request shape without touching the network.
pub fn validate_content(req: ContentRequest) -> Result<ContentInput, AuditError> {
    let keywords = clean_keywords(req.keywords)?;
    let url = req.url.as_deref().map(pages::parse_http_url).transpose()?;
    let inline = req
        .content
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string);

    let source = match (inline, url) {
        (Some(text), url) => ContentSource::Inline { url, text },
        (None, Some(url)) => ContentSource::Page(url),
        (None, None) => return Err(AuditError::validation("either url or content is required")),
    };
    Ok(ContentInput { source, keywords })
}

/// Resolve the text to analyse, fetching and flattening the page when only a URL was given.
pub async fn resolve_content(
    state: &AppState,
    input: ContentInput,
) -> Result<PreparedContent, AuditError> {
    let max_chars = state.config.gemini.max_input_chars;
    let (source, text) = match input.source {
        ContentSource::Inline { url, text } => (
            url.map(|u| u.to_string()).unwrap_or_else(|| "inline".to_string()),
            text,
        ),
        ContentSource::Page(url) => {
            let html = pages::fetch_html(
                &state.http,
                &url,
                PAGE_FETCH_TIMEOUT,
                state.config.basic.max_page_bytes,
            )
            .await?;
            let text = pages::html_to_text(&html);
            if text.is_empty() {
                return Err(AuditError::validation("page has no readable text"));
            }
            (url.to_string(), text)
        }
    };

    Ok(PreparedContent {
        source,
        text: pages::truncate_chars(&text, max_chars).to_string(),
        keywords: input.keywords,
    })
}

pub fn content_prompt(prepared: &PreparedContent) -> String {
    let keywords = if prepared.keywords.is_empty() {
        "none provided".to_string()
    } else {
        prepared.keywords.join(", ")
    };
    format!(
        "You are an SEO and content quality auditor. Analyse the web page text below.\n\
         Target keywords: {keywords}.\n\
         Respond with a JSON object with these fields:\n\
         \"score\" (number 0-100, overall content quality), \"summary\" (string),\n\
         \"readability\" (short string), \"seo_issues\" (array of strings),\n\
         \"suggestions\" (array of strings), \"keywords\" (array of the main topics found).\n\n\
         Page text:\n{}",
        prepared.text
    )
}

pub fn image_prompt(alt_text: Option<&str>) -> String {
    let alt = alt_text
        .map(|a| format!("The current alt text is: \"{a}\"."))
        .unwrap_or_else(|| "The image has no alt text.".to_string());
    format!(
        "You are a web accessibility and SEO auditor. Look at the attached image. {alt}\n\
         Respond with a JSON object with these fields:\n\
         \"score\" (number 0-100, how well the image and its alt text serve the page),\n\
         \"description\" (string), \"alt_text\" (a suggested alt text),\n\
         \"issues\" (array of strings)."
    )
}

/// Decode the model's JSON answer, tolerating markdown code fences.
pub fn parse_model_json<T: DeserializeOwned>(text: &str) -> Option<T> {
    let trimmed = text.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed);
    serde_json::from_str(unfenced.trim()).ok()
}

fn clamp_score(score: Option<f64>) -> Option<f64> {
    score.filter(|s| s.is_finite()).map(|s| s.clamp(0.0, 100.0))
}

pub async fn analyze_content(
    state: &AppState,
    prepared: &PreparedContent,
) -> Result<ContentAnalysis, AuditError> {
    let request = GenerateContentRequest::json_prompt(vec![Part::text(content_prompt(prepared))]);
    let response = state.gemini.generate(&request).await?;
    let text = response.text().ok_or(AuditError::UpstreamPayload {
        service: "Gemini API",
        detail: "no text in response".to_string(),
    })?;
    let mut analysis = parse_model_json::<ContentAnalysis>(&text).unwrap_or_else(|| {
        debug!("model answer was not JSON; returning raw text");
        ContentAnalysis {
            summary: text.trim().to_string(),
            ..Default::default()
        }
    });
    analysis.score = clamp_score(analysis.score);
    Ok(analysis)
}

/// Download an image for inline submission: must be `image/*` and within the size cap.
pub async fn fetch_image(
    state: &AppState,
    image_url: &str,
) -> Result<(String, Vec<u8>), AuditError> {
    const SERVICE: &str = "image host";
    let url = pages::parse_http_url(image_url)?;
    let max_bytes = state.config.gemini.max_image_bytes;

    let resp = state
        .http
        .get(url)
        .timeout(PAGE_FETCH_TIMEOUT)
        .send()
        .await
        .map_err(|e| AuditError::upstream(SERVICE, e))?
        .error_for_status()
        .map_err(|e| AuditError::upstream(SERVICE, e))?;

    let mime = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase())
        .unwrap_or_default();
    if !mime.starts_with("image/") {
        return Err(AuditError::validation(format!(
            "image_url does not point to an image (content-type `{mime}`)"
        )));
    }
    if resp.content_length().is_some_and(|len| len as usize > max_bytes) {
        return Err(AuditError::validation(format!(
            "image is larger than {max_bytes} bytes"
        )));
    }
    let bytes = resp
        .bytes()
        .await
        .map_err(|e| AuditError::upstream(SERVICE, e))?;
    if bytes.len() > max_bytes {
        return Err(AuditError::validation(format!(
            "image is larger than {max_bytes} bytes"
        )));
    }
    Ok((mime, bytes.to_vec()))
}

pub async fn analyze_image(state: &AppState, req: &ImageRequest) -> Result<ImageAnalysis, AuditError> {
    let (mime, bytes) = fetch_image(state, &req.image_url).await?;
    debug!(mime = %mime, bytes = bytes.len(), "image fetched for analysis");
    let data = base64::engine::general_purpose::STANDARD.encode(&bytes);
    let alt = req.alt_text.as_deref().map(str::trim).filter(|a| !a.is_empty());
    let request = GenerateContentRequest::json_prompt(vec![
        Part::text(image_prompt(alt)),
        Part::inline(mime, data),
    ]);
    let response = state.gemini.generate(&request).await?;
    let text = response.text().ok_or(AuditError::UpstreamPayload {
        service: "Gemini API",
        detail: "no text in response".to_string(),
    })?;
    let mut analysis = parse_model_json::<ImageAnalysis>(&text).unwrap_or_else(|| ImageAnalysis {
        description: text.trim().to_string(),
        ..Default::default()
    });
    analysis.score = clamp_score(analysis.score);
    Ok(analysis)
}

/// Persist a finished content analysis and run content-score alerts.
/// Returns the ids of alerts that fired.
pub async fn record_content(
    state: &AppState,
    user: &User,
    prepared: &PreparedContent,
    analysis: &ContentAnalysis,
) -> Vec<i64> {
    let summary = serde_json::to_value(analysis).unwrap_or_default();
    if let Err(e) = state
        .storage
        .record_audit(user.id, &prepared.source, AuditKind::Content, analysis.score, &summary)
        .await
    {
        warn!(user_id = user.id, error = %e, "recording content audit failed");
    }
    match analysis.score {
        Some(score) => {
            alert_eval::evaluate(state, user, &prepared.source, AlertMetric::ContentScore, score)
                .await
        }
        None => Vec::new(),
    }
}
