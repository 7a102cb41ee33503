//! Fetching audited pages and reducing them to links or plain text.

use crate::error::AuditError;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;
use url::Url;

const SERVICE: &str = "target site";

static HREF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\bhref\s*=\s*["']([^"']+)["']"#).expect("valid regex"));
static SCRIPT_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style|noscript)\b.*?</(script|style|noscript)\s*>").expect("valid regex")
});
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));
static SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Parse a user-supplied audit target; only absolute http(s) URLs are accepted.
pub fn parse_http_url(raw: &str) -> Result<Url, AuditError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AuditError::validation("url is required"));
    }
    let url = Url::parse(raw).map_err(|e| AuditError::validation(format!("invalid url: {e}")))?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        _ => Err(AuditError::validation("url must be an absolute http(s) URL")),
    }
}

/// GET `url` as text, refusing bodies over `max_bytes`.
pub async fn fetch_html(
    client: &reqwest::Client,
    url: &Url,
    timeout: Duration,
    max_bytes: usize,
) -> Result<String, AuditError> {
    let mut resp = client
        .get(url.clone())
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| AuditError::upstream(SERVICE, e))?
        .error_for_status()
        .map_err(|e| AuditError::upstream(SERVICE, e))?;

    let too_large = || AuditError::validation(format!("page is larger than {max_bytes} bytes"));
    if resp.content_length().is_some_and(|len| len as usize > max_bytes) {
        return Err(too_large());
    }
    let mut body = Vec::new();
    while let Some(chunk) = resp
        .chunk()
        .await
        .map_err(|e| AuditError::upstream(SERVICE, e))?
    {
        if body.len() + chunk.len() > max_bytes {
            return Err(too_large());
        }
        body.extend_from_slice(&chunk);
    }
    Ok(String::from_utf8_lossy(&body).into_owned())
}

/// Absolute http(s) link targets in document order, without fragments or duplicates.
pub fn extract_links(html: &str, base: &Url, cap: usize) -> Vec<Url> {
    let mut seen = HashSet::new();
    HREF.captures_iter(html)
        .filter_map(|c| c.get(1))
        .filter_map(|m| base.join(m.as_str().trim()).ok())
        .filter(|u| matches!(u.scheme(), "http" | "https"))
        .map(|mut u| {
            u.set_fragment(None);
            u
        })
        .filter(|u| seen.insert(u.as_str().to_string()))
        .take(cap)
        .collect()
}

/// Visible text of an HTML document, whitespace-collapsed.
pub fn html_to_text(html: &str) -> String {
    let without_code = SCRIPT_STYLE.replace_all(html, " ");
    let without_tags = TAG.replace_all(&without_code, " ");
    let decoded = without_tags
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");
    SPACE.replace_all(&decoded, " ").trim().to_string()
}

/// Cut `text` to at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
