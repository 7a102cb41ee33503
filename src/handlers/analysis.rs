use axum::{
    Json,
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::Stream;
use serde::Serialize;
use serde_json::json;
use std::convert::Infallible;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::db::models::{AuditKind, User};
use crate::error::AuditError;
use crate::middleware::{AuthUser, JsonBody};
use crate::router::AppState;
use crate::service::access::{self, Feature, Grant};
use crate::service::analysis::{self, ContentRequest, ImageRequest, PreparedContent};
use crate::service::pages::parse_http_url;
use crate::types::Envelope;
use crate::types::analysis::{ContentAnalysis, ImageAnalysis};

#[derive(Debug, Serialize)]
pub struct AnalysisResponse<T> {
    pub url: String,
    pub analysis: T,
    pub grant: Grant,
    pub triggered_alerts: Vec<i64>,
}

async fn prepare(
    state: &AppState,
    user: &User,
    req: ContentRequest,
) -> Result<(PreparedContent, Grant), AuditError> {
    let input = analysis::validate_content(req)?;
    let grant = access::authorize(state, user, Feature::ContentAnalysis).await?;
    let resolved = analysis::resolve_content(state, input).await;
    let prepared = access::refund_on_error(state, user, grant, resolved).await?;
    Ok((prepared, grant))
}

pub async fn content(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    JsonBody(req): JsonBody<ContentRequest>,
) -> Result<Json<Envelope<AnalysisResponse<ContentAnalysis>>>, AuditError> {
    let (prepared, grant) = prepare(&state, &user, req).await?;
    let outcome = analysis::analyze_content(&state, &prepared).await;
    let result = access::refund_on_error(&state, &user, grant, outcome).await?;
    let triggered_alerts = analysis::record_content(&state, &user, &prepared, &result).await;
    Ok(Envelope::ok(AnalysisResponse {
        url: prepared.source,
        analysis: result,
        grant,
        triggered_alerts,
    }))
}

pub async fn image(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    JsonBody(req): JsonBody<ImageRequest>,
) -> Result<Json<Envelope<AnalysisResponse<ImageAnalysis>>>, AuditError> {
    let url = parse_http_url(&req.image_url)?.to_string();
    let grant = access::authorize(&state, &user, Feature::ImageAnalysis).await?;
    let outcome = analysis::analyze_image(&state, &req).await;
    let result = access::refund_on_error(&state, &user, grant, outcome).await?;

    let summary = serde_json::to_value(&result)?;
    if let Err(e) = state
        .storage
        .record_audit(user.id, &url, AuditKind::Image, result.score, &summary)
        .await
    {
        warn!(user_id = user.id, error = %e, "recording image audit failed");
    }
    Ok(Envelope::ok(AnalysisResponse {
        url,
        analysis: result,
        grant,
        triggered_alerts: Vec::new(),
    }))
}

/// Progress estimate against the upstream timeout; never reaches 100 before the result.
fn progress_payload(elapsed: Duration, expected: Duration) -> serde_json::Value {
    let expected_ms = expected.as_millis().max(1);
    let percent = (elapsed.as_millis() * 100 / expected_ms).min(95) as u64;
    json!({
        "stage": "analyzing",
        "percent": percent,
        "elapsed_ms": elapsed.as_millis() as u64,
    })
}

fn progress_event(elapsed: Duration, expected: Duration) -> Event {
    Event::default()
        .event("progress")
        .data(progress_payload(elapsed, expected).to_string())
}

/// Streams `progress` events while the single model call runs, then `result` or `error`.
pub async fn content_stream(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    JsonBody(req): JsonBody<ContentRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AuditError> {
    let (prepared, grant) = prepare(&state, &user, req).await?;
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(16);

    tokio::spawn(async move {
        let started = Instant::now();
        let expected = Duration::from_secs(state.config.gemini.timeout_secs);
        let mut ticker =
            tokio::time::interval(Duration::from_millis(state.config.gemini.progress_interval_ms.max(1)));

        let call = analysis::analyze_content(&state, &prepared);
        tokio::pin!(call);
        let outcome = loop {
            tokio::select! {
                res = &mut call => break res,
                _ = ticker.tick() => {
                    // a closed receiver just drops the event
                    let _ = tx.send(Ok(progress_event(started.elapsed(), expected))).await;
                }
            }
        };

        let event = match outcome {
            Ok(result) => {
                let triggered_alerts =
                    analysis::record_content(&state, &user, &prepared, &result).await;
                let data = json!({
                    "success": true,
                    "data": AnalysisResponse {
                        url: prepared.source.clone(),
                        analysis: result,
                        grant,
                        triggered_alerts,
                    },
                });
                Event::default().event("result").data(data.to_string())
            }
            Err(e) => {
                warn!(user_id = user.id, error = %e, "streamed analysis failed");
                access::refund(&state, &user, grant).await;
                let data = json!({ "error": e.body() });
                Event::default().event("error").data(data.to_string())
            }
        };
        if tx.send(Ok(event)).await.is_err() {
            debug!(user_id = user.id, "analysis stream closed before the result");
        }
    });

    Ok(Sse::new(ReceiverStream::new(rx)).keep_alive(KeepAlive::default()))
}
