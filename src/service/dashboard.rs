//! Dashboard read models: summary card, per-day chart and the activity feed.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;

use crate::db::models::{Alert, Audit, Payment, User};
use crate::error::AuditError;
use crate::router::AppState;
use crate::service::access;

pub const DEFAULT_CHART_DAYS: i64 = 30;
pub const MAX_CHART_DAYS: i64 = 90;
pub const DEFAULT_ACTIVITY_LIMIT: i64 = 10;
pub const MAX_ACTIVITY_LIMIT: i64 = 50;

/// Accept `value` when it is within `1..=max`, default when absent.
pub fn bounded(name: &str, value: Option<i64>, default: i64, max: i64) -> Result<i64, AuditError> {
    match value {
        None => Ok(default),
        Some(v) if (1..=max).contains(&v) => Ok(v),
        Some(_) => Err(AuditError::validation(format!(
            "{name} must be between 1 and {max}"
        ))),
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PlanSummary {
    pub id: i64,
    pub name: String,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Summary {
    pub total_audits: i64,
    pub audits_this_month: i64,
    pub average_score: Option<f64>,
    pub credits: i64,
    pub plan: Option<PlanSummary>,
    pub active_alerts: i64,
}

pub async fn summary(state: &AppState, user: &User) -> Result<Summary, AuditError> {
    let now = Utc::now();
    let storage = &state.storage;
    let plan = access::load_plan(state, user).await?;
    let plan = access::effective_plan(user, plan.as_ref(), now).map(|p| PlanSummary {
        id: p.id,
        name: p.name.clone(),
        expires_at: user.plan_expires_at,
    });

    Ok(Summary {
        total_audits: storage.count_audits(user.id).await?,
        audits_this_month: storage
            .count_audits_since(user.id, access::month_start(now))
            .await?,
        average_score: storage.average_score(user.id).await?,
        credits: user.credits,
        plan,
        active_alerts: storage.count_active_alerts(user.id).await?,
    })
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChartBucket {
    pub date: NaiveDate,
    pub audits: i64,
    pub average_score: Option<f64>,
}

/// One bucket per day ending at `today`, oldest first; empty days are zero-filled.
pub fn bucket_by_day(
    points: &[(DateTime<Utc>, Option<f64>)],
    days: i64,
    today: NaiveDate,
) -> Vec<ChartBucket> {
    let first = today - Duration::days(days - 1);
    let mut buckets: BTreeMap<NaiveDate, (i64, f64, i64)> = (0..days)
        .map(|offset| (first + Duration::days(offset), (0, 0.0, 0)))
        .collect();

    for (at, score) in points {
        if let Some((count, sum, scored)) = buckets.get_mut(&at.date_naive()) {
            *count += 1;
            if let Some(s) = score {
                *sum += s;
                *scored += 1;
            }
        }
    }

    buckets
        .into_iter()
        .map(|(date, (audits, sum, scored))| ChartBucket {
            date,
            audits,
            average_score: (scored > 0).then(|| sum / scored as f64),
        })
        .collect()
}

pub async fn charts(state: &AppState, user: &User, days: i64) -> Result<Vec<ChartBucket>, AuditError> {
    let today = Utc::now().date_naive();
    let first = today - Duration::days(days - 1);
    let since = first.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
    let points = state.storage.audit_points_since(user.id, since).await?;
    Ok(bucket_by_day(&points, days, today))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Audit,
    Payment,
    AlertTriggered,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ActivityItem {
    pub kind: ActivityKind,
    pub id: i64,
    pub at: DateTime<Utc>,
    pub title: String,
    pub detail: Value,
}

impl From<&Audit> for ActivityItem {
    fn from(a: &Audit) -> Self {
        Self {
            kind: ActivityKind::Audit,
            id: a.id,
            at: a.created_at,
            title: format!("{} audit of {}", a.kind, a.url),
            detail: json!({ "kind": a.kind, "url": a.url, "score": a.score }),
        }
    }
}

impl From<&Payment> for ActivityItem {
    fn from(p: &Payment) -> Self {
        Self {
            kind: ActivityKind::Payment,
            id: p.id,
            at: p.updated_at,
            title: format!("{} payment {}", p.kind, p.status),
            detail: json!({
                "kind": p.kind,
                "status": p.status,
                "amount": p.amount,
                "currency": p.currency,
            }),
        }
    }
}

/// Merge the three feeds newest first and keep `limit` entries.
pub fn merge_activity(
    audits: &[Audit],
    payments: &[Payment],
    alerts: &[Alert],
    limit: usize,
) -> Vec<ActivityItem> {
    let triggered = alerts.iter().filter_map(|a| {
        a.last_triggered_at.map(|at| ActivityItem {
            kind: ActivityKind::AlertTriggered,
            id: a.id,
            at,
            title: format!("Alert \"{}\" triggered", a.name),
            detail: json!({
                "metric": a.metric,
                "comparison": a.comparison,
                "threshold": a.threshold,
                "url": a.url,
            }),
        })
    });

    let mut items: Vec<ActivityItem> = audits
        .iter()
        .map(ActivityItem::from)
        .chain(payments.iter().map(ActivityItem::from))
        .chain(triggered)
        .collect();
    items.sort_by(|a, b| b.at.cmp(&a.at).then(b.id.cmp(&a.id)));
    items.truncate(limit);
    items
}

pub async fn activity(state: &AppState, user: &User, limit: i64) -> Result<Vec<ActivityItem>, AuditError> {
    let storage = &state.storage;
    let audits = storage.recent_audits(user.id, limit).await?;
    let payments = storage.recent_payments(user.id, limit).await?;
    let alerts = storage.recently_triggered_alerts(user.id, limit).await?;
    Ok(merge_activity(&audits, &payments, &alerts, limit as usize))
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Revenue {
    pub currency: String,
    pub amount: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AdminStats {
    pub users: i64,
    pub audits: i64,
    pub revenue: Vec<Revenue>,
}

pub async fn admin_stats(state: &AppState) -> Result<AdminStats, AuditError> {
    let storage = &state.storage;
    let revenue = storage
        .captured_revenue()
        .await?
        .into_iter()
        .map(|(currency, amount)| Revenue { currency, amount })
        .collect();
    Ok(AdminStats {
        users: storage.count_users().await?,
        audits: storage.count_all_audits().await?,
        revenue,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{
        AlertMetric, AuditKind, Comparison, JsonText, PaymentKind, PaymentStatus,
    };
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn days_and_limits_are_bounded() {
        assert_eq!(bounded("days", None, 30, 90).unwrap(), 30);
        assert_eq!(bounded("days", Some(90), 30, 90).unwrap(), 90);
        assert!(bounded("days", Some(0), 30, 90).is_err());
        assert!(bounded("days", Some(91), 30, 90).is_err());
    }

    #[test]
    fn chart_zero_fills_and_averages_scored_audits() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 5).unwrap();
        let points = vec![
            (at(1, 10), Some(99.0)), // before the window
            (at(3, 8), Some(60.0)),
            (at(3, 20), Some(80.0)),
            (at(3, 21), None),
            (at(5, 1), None),
        ];
        let chart = bucket_by_day(&points, 3, today);
        assert_eq!(chart.len(), 3);
        assert_eq!(chart[0].date, NaiveDate::from_ymd_opt(2026, 3, 3).unwrap());
        assert_eq!(chart[0].audits, 3);
        assert_eq!(chart[0].average_score, Some(70.0));
        assert_eq!(chart[1].audits, 0);
        assert_eq!(chart[1].average_score, None);
        assert_eq!(chart[2].audits, 1);
        assert_eq!(chart[2].average_score, None);
    }

    #[test]
    fn activity_is_merged_newest_first() {
        let audit = Audit {
            id: 1,
            user_id: 1,
            url: "https://example.com".into(),
            kind: AuditKind::PageSpeed,
            score: Some(88.0),
            summary: JsonText::default(),
            created_at: at(2, 0),
        };
        let payment = Payment {
            id: 2,
            user_id: 1,
            kind: PaymentKind::Credits,
            gateway_order_id: Some("order_1".into()),
            gateway_subscription_id: None,
            gateway_payment_id: None,
            amount: 500,
            currency: "INR".into(),
            credits: 5,
            status: PaymentStatus::Captured,
            credit_package_id: Some(1),
            plan_id: None,
            created_at: at(1, 0),
            updated_at: at(4, 0),
        };
        let fired = Alert {
            id: 3,
            user_id: 1,
            name: "slow".into(),
            url: None,
            metric: AlertMetric::PerformanceScore,
            comparison: Comparison::Below,
            threshold: 50.0,
            enabled: true,
            last_triggered_at: Some(at(3, 0)),
            created_at: at(1, 0),
            updated_at: at(1, 0),
        };
        let mut quiet = fired.clone();
        quiet.id = 4;
        quiet.last_triggered_at = None;

        let feed = merge_activity(&[audit], &[payment], &[fired, quiet], 10);
        let kinds: Vec<ActivityKind> = feed.iter().map(|i| i.kind).collect();
        assert_eq!(
            kinds,
            vec![ActivityKind::Payment, ActivityKind::AlertTriggered, ActivityKind::Audit]
        );
        assert_eq!(merge_activity(&[], &[], &[], 10).len(), 0);
    }
}
