use futures::stream::{self, StreamExt};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::db::models::NewLinkResult;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkStatus {
    pub url: String,
    pub status: Option<u16>,
    pub ok: bool,
    pub error: Option<String>,
}

impl LinkStatus {
    pub fn to_row(&self) -> NewLinkResult {
        NewLinkResult {
            url: self.url.clone(),
            status: self.status,
            error: self.error.clone(),
        }
    }
}

/// HEAD first; servers that refuse HEAD get a GET.
pub async fn check_link(client: &reqwest::Client, url: &Url, timeout: Duration) -> LinkStatus {
    let head = client.head(url.clone()).timeout(timeout).send().await;
    let result = match head {
        Ok(resp)
            if resp.status() == StatusCode::METHOD_NOT_ALLOWED
                || resp.status() == StatusCode::NOT_IMPLEMENTED =>
        {
            client.get(url.clone()).timeout(timeout).send().await
        }
        other => other,
    };
    match result {
        Ok(resp) => {
            let status = resp.status();
            LinkStatus {
                url: url.to_string(),
                status: Some(status.as_u16()),
                ok: !(status.is_client_error() || status.is_server_error()),
                error: None,
            }
        }
        Err(e) => {
            debug!(url = %url, error = %e, "link check failed");
            let error = if e.is_timeout() {
                "timed out".to_string()
            } else if e.is_connect() {
                "connection failed".to_string()
            } else {
                e.to_string()
            };
            LinkStatus {
                url: url.to_string(),
                status: None,
                ok: false,
                error: Some(error),
            }
        }
    }
}

/// Check every link with at most `concurrency` requests in flight; output keeps input order.
pub async fn check_links(
    client: &reqwest::Client,
    links: Vec<Url>,
    concurrency: usize,
    timeout: Duration,
) -> Vec<LinkStatus> {
    stream::iter(links)
        .map(|url| async move { check_link(client, &url, timeout).await })
        .buffered(concurrency.max(1))
        .collect()
        .await
}
