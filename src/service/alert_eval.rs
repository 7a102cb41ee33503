use chrono::Utc;
use tracing::{info, warn};

use crate::api::OutgoingEmail;
use crate::db::models::{Alert, AlertMetric, User};
use crate::router::AppState;

fn same_page(a: &str, b: &str) -> bool {
    a.trim_end_matches('/').eq_ignore_ascii_case(b.trim_end_matches('/'))
}

/// Alerts whose condition holds for `value` observed on `url`.
pub fn triggered<'a>(alerts: &'a [Alert], url: &str, value: f64) -> Vec<&'a Alert> {
    alerts
        .iter()
        .filter(|a| a.enabled)
        .filter(|a| a.url.as_deref().is_none_or(|u| same_page(u, url)))
        .filter(|a| a.comparison.matches(value, a.threshold))
        .collect()
}

fn notification(user: &User, alert: &Alert, url: &str, value: f64) -> OutgoingEmail {
    OutgoingEmail {
        to: user.email.clone(),
        subject: format!("Alert triggered: {}", alert.name),
        text: format!(
            "Your alert \"{}\" fired for {url}.\n\n{} is {value:.2}, which is {} the threshold of {:.2}.",
            alert.name, alert.metric, alert.comparison, alert.threshold
        ),
        html: None,
    }
}

/// Compare a fresh measurement with the user's alerts. Failures are logged, never
/// surfaced: the measurement itself already succeeded. Notifications are sent in
/// the background.
pub async fn evaluate(
    state: &AppState,
    user: &User,
    url: &str,
    metric: AlertMetric,
    value: f64,
) -> Vec<i64> {
    let alerts = match state.storage.list_enabled_alerts(user.id, metric).await {
        Ok(alerts) => alerts,
        Err(e) => {
            warn!(user_id = user.id, error = %e, "loading alerts failed");
            return Vec::new();
        }
    };

    let now = Utc::now();
    let mut fired = Vec::new();
    for alert in triggered(&alerts, url, value) {
        if let Err(e) = state.storage.mark_alert_triggered(alert.id, now).await {
            warn!(alert_id = alert.id, error = %e, "marking alert triggered failed");
            continue;
        }
        info!(alert_id = alert.id, user_id = user.id, metric = %metric, value, "alert triggered");
        fired.push(alert.id);

        if let Some(mailer) = state.mailer.clone() {
            let email = notification(user, alert, url, value);
            let alert_id = alert.id;
            tokio::spawn(async move {
                if let Err(e) = mailer.send(email).await {
                    warn!(alert_id, error = %e, "alert notification failed");
                }
            });
        }
    }
    fired
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Comparison;

    fn alert(id: i64, url: Option<&str>, comparison: Comparison, threshold: f64) -> Alert {
        Alert {
            id,
            user_id: 1,
            name: format!("alert {id}"),
            url: url.map(str::to_string),
            metric: AlertMetric::PerformanceScore,
            comparison,
            threshold,
            enabled: true,
            last_triggered_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn matches_threshold_and_url_scope() {
        let alerts = vec![
            alert(1, None, Comparison::Below, 50.0),
            alert(2, Some("https://example.com/"), Comparison::Below, 80.0),
            alert(3, Some("https://other.com"), Comparison::Below, 80.0),
            alert(4, None, Comparison::Above, 10.0),
        ];
        let ids: Vec<i64> = triggered(&alerts, "https://example.com", 42.0)
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec![1, 2, 4]);
    }

    #[test]
    fn disabled_alerts_never_fire() {
        let mut a = alert(1, None, Comparison::Below, 50.0);
        a.enabled = false;
        assert!(triggered(&[a], "https://example.com", 0.0).is_empty());
    }
}
