//! Plan gating: which features a caller may use right now, and at what cost.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::db::models::{Plan, User};
use crate::error::AuditError;
use crate::router::AppState;
use crate::types::text_enum::text_enum;

text_enum! {
    pub enum Feature ("feature") {
        PageSpeed => "pagespeed",
        LinkCheck => "link_check",
        ContentAnalysis => "content_analysis",
        ImageAnalysis => "image_analysis",
        Scrape => "scrape",
        Alerts => "alerts",
    }
}

impl Feature {
    /// Features a user without plan coverage can still pay for with one credit.
    pub fn credit_eligible(&self) -> bool {
        matches!(
            self,
            Feature::ContentAnalysis | Feature::ImageAnalysis | Feature::Scrape
        )
    }

    /// Metered features count against the monthly audit quota.
    pub fn is_metered(&self) -> bool {
        !matches!(self, Feature::Alerts)
    }
}

/// Why a request was let through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Grant {
    Admin,
    Plan,
    Free,
    Credit,
}

#[derive(Debug, Clone)]
pub struct AccessRequest<'a> {
    pub user: &'a User,
    pub plan: Option<&'a Plan>,
    pub feature: Feature,
    pub audits_this_month: i64,
    pub free_features: &'a [Feature],
    pub free_audit_limit: i64,
    pub now: DateTime<Utc>,
}

/// The user's plan if it is active and not expired.
pub fn effective_plan<'a>(
    user: &User,
    plan: Option<&'a Plan>,
    now: DateTime<Utc>,
) -> Option<&'a Plan> {
    let plan = plan.filter(|p| p.is_active && user.plan_id == Some(p.id))?;
    match user.plan_expires_at {
        Some(expires) if expires <= now => None,
        _ => Some(plan),
    }
}

pub fn decide(req: &AccessRequest<'_>) -> Result<Grant, AuditError> {
    if req.user.is_admin() {
        return Ok(Grant::Admin);
    }

    let plan = effective_plan(req.user, req.plan, req.now);
    let limit = match plan {
        Some(p) => p.audit_limit,
        None => Some(req.free_audit_limit),
    };
    let within_quota =
        !req.feature.is_metered() || limit.is_none_or(|l| req.audits_this_month < l);
    let can_pay = req.feature.credit_eligible() && req.user.credits > 0;

    let covered = if plan.is_some_and(|p| p.features.contains(req.feature)) {
        Some(Grant::Plan)
    } else if req.free_features.contains(&req.feature) {
        Some(Grant::Free)
    } else {
        None
    };

    match covered {
        Some(grant) if within_quota => Ok(grant),
        _ if can_pay => Ok(Grant::Credit),
        Some(_) => Err(AuditError::QuotaExceeded(limit.unwrap_or_default())),
        None => Err(AuditError::PlanAccessDenied(req.feature.to_string())),
    }
}

pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

/// Load the user's plan, tolerating a plan that has since been deleted.
pub async fn load_plan(state: &AppState, user: &User) -> Result<Option<Plan>, AuditError> {
    let Some(plan_id) = user.plan_id else {
        return Ok(None);
    };
    match state.storage.get_plan(plan_id).await {
        Ok(plan) => Ok(Some(plan)),
        Err(AuditError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Decide access for `feature` and consume a credit when that is what pays for it.
pub async fn authorize(
    state: &AppState,
    user: &User,
    feature: Feature,
) -> Result<Grant, AuditError> {
    if user.is_admin() {
        return Ok(Grant::Admin);
    }
    let now = Utc::now();
    let plan = load_plan(state, user).await?;
    let audits_this_month = if feature.is_metered() {
        state
            .storage
            .count_audits_since(user.id, month_start(now))
            .await?
    } else {
        0
    };

    let grant = decide(&AccessRequest {
        user,
        plan: plan.as_ref(),
        feature,
        audits_this_month,
        free_features: &state.config.access.free_features,
        free_audit_limit: state.config.access.free_audit_limit,
        now,
    })?;

    if grant == Grant::Credit && !state.storage.consume_credit(user.id).await? {
        return Err(AuditError::PlanAccessDenied(feature.to_string()));
    }
    debug!(user_id = user.id, feature = %feature, grant = ?grant, "access granted");
    Ok(grant)
}

/// Return the credit a request paid with when the work it paid for failed.
pub async fn refund(state: &AppState, user: &User, grant: Grant) {
    if grant != Grant::Credit {
        return;
    }
    match state.storage.add_credits(user.id, 1).await {
        Ok(_) => info!(user_id = user.id, "credit refunded after failed request"),
        Err(e) => warn!(user_id = user.id, error = %e, "credit refund failed"),
    }
}

/// Pass `result` through, refunding the credit first when it is an error.
pub async fn refund_on_error<T>(
    state: &AppState,
    user: &User,
    grant: Grant,
    result: Result<T, AuditError>,
) -> Result<T, AuditError> {
    if result.is_err() {
        refund(state, user, grant).await;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{BillingInterval, FeatureList, Role};
    use chrono::Duration;

    fn user(role: Role, plan_id: Option<i64>, credits: i64) -> User {
        User {
            id: 7,
            email: "a@example.com".into(),
            name: None,
            role,
            api_key_hash: String::new(),
            plan_id,
            plan_expires_at: None,
            credits,
            created_at: Utc::now(),
        }
    }

    fn plan(features: Vec<Feature>, audit_limit: Option<i64>) -> Plan {
        Plan {
            id: 1,
            name: "Pro".into(),
            description: String::new(),
            price: 1_000,
            currency: "INR".into(),
            interval: BillingInterval::Monthly,
            features: FeatureList(features),
            audit_limit,
            gateway_plan_id: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn request<'a>(
        user: &'a User,
        plan: Option<&'a Plan>,
        feature: Feature,
        audits: i64,
    ) -> AccessRequest<'a> {
        AccessRequest {
            user,
            plan,
            feature,
            audits_this_month: audits,
            free_features: &[Feature::PageSpeed, Feature::LinkCheck],
            free_audit_limit: 3,
            now: Utc::now(),
        }
    }

    #[test]
    fn admin_bypasses_everything() {
        let u = user(Role::Admin, None, 0);
        let grant = decide(&request(&u, None, Feature::Scrape, 1_000)).unwrap();
        assert_eq!(grant, Grant::Admin);
    }

    #[test]
    fn plan_feature_is_granted_within_quota() {
        let p = plan(vec![Feature::ContentAnalysis], Some(5));
        let u = user(Role::User, Some(1), 0);
        assert_eq!(
            decide(&request(&u, Some(&p), Feature::ContentAnalysis, 4)).unwrap(),
            Grant::Plan
        );
        let err = decide(&request(&u, Some(&p), Feature::ContentAnalysis, 5)).unwrap_err();
        assert!(matches!(err, AuditError::QuotaExceeded(5)));
    }

    #[test]
    fn free_tier_uses_free_limit() {
        let u = user(Role::User, None, 0);
        assert_eq!(
            decide(&request(&u, None, Feature::PageSpeed, 2)).unwrap(),
            Grant::Free
        );
        assert!(matches!(
            decide(&request(&u, None, Feature::PageSpeed, 3)),
            Err(AuditError::QuotaExceeded(3))
        ));
    }

    #[test]
    fn credits_pay_for_uncovered_eligible_features() {
        let u = user(Role::User, None, 2);
        assert_eq!(
            decide(&request(&u, None, Feature::ImageAnalysis, 100)).unwrap(),
            Grant::Credit
        );
        let broke = user(Role::User, None, 0);
        assert!(matches!(
            decide(&request(&broke, None, Feature::ImageAnalysis, 0)),
            Err(AuditError::PlanAccessDenied(f)) if f == "image_analysis"
        ));
    }

    #[test]
    fn alerts_are_not_metered_and_not_purchasable() {
        let p = plan(vec![Feature::Alerts], Some(1));
        let u = user(Role::User, Some(1), 0);
        assert_eq!(
            decide(&request(&u, Some(&p), Feature::Alerts, 50)).unwrap(),
            Grant::Plan
        );
        let rich = user(Role::User, None, 10);
        assert!(decide(&request(&rich, None, Feature::Alerts, 0)).is_err());
    }

    #[test]
    fn expired_plan_falls_back_to_free_tier() {
        let p = plan(vec![Feature::ContentAnalysis], None);
        let mut u = user(Role::User, Some(1), 0);
        u.plan_expires_at = Some(Utc::now() - Duration::days(1));
        assert!(effective_plan(&u, Some(&p), Utc::now()).is_none());
        assert!(matches!(
            decide(&request(&u, Some(&p), Feature::ContentAnalysis, 0)),
            Err(AuditError::PlanAccessDenied(_))
        ));
    }

    #[test]
    fn unlimited_plan_has_no_quota() {
        let p = plan(vec![Feature::Scrape], None);
        let u = user(Role::User, Some(1), 0);
        assert_eq!(
            decide(&request(&u, Some(&p), Feature::Scrape, 10_000)).unwrap(),
            Grant::Plan
        );
    }

    #[test]
    fn month_start_is_first_midnight() {
        let now = Utc.with_ymd_and_hms(2026, 10, 17, 13, 5, 0).unwrap();
        assert_eq!(
            month_start(now),
            Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap()
        );
    }
}
