use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

use crate::service::access::Feature;
use crate::types::text_enum::text_enum;

text_enum! {
    pub enum Role ("role") {
        User => "user",
        Admin => "admin",
    }
}

text_enum! {
    pub enum BillingInterval ("interval") {
        Monthly => "monthly",
        Yearly => "yearly",
    }
}

text_enum! {
    pub enum AlertMetric ("metric") {
        PerformanceScore => "performance_score",
        BrokenLinks => "broken_links",
        ContentScore => "content_score",
    }
}

text_enum! {
    pub enum Comparison ("comparison") {
        Below => "below",
        Above => "above",
    }
}

text_enum! {
    pub enum AuditKind ("audit kind") {
        PageSpeed => "pagespeed",
        Content => "content",
        Image => "image",
        Links => "links",
        Scrape => "scrape",
    }
}

text_enum! {
    pub enum PaymentKind ("payment kind") {
        Credits => "credits",
        Subscription => "subscription",
    }
}

text_enum! {
    pub enum PaymentStatus ("payment status") {
        Created => "created",
        Captured => "captured",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

impl Comparison {
    pub fn matches(&self, value: f64, threshold: f64) -> bool {
        match self {
            Comparison::Below => value < threshold,
            Comparison::Above => value > threshold,
        }
    }
}

/// JSON array column holding plan features.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct FeatureList(pub Vec<Feature>);

impl FeatureList {
    pub fn contains(&self, feature: Feature) -> bool {
        self.0.contains(&feature)
    }

    pub fn to_json(&self) -> String {
        let names: Vec<&str> = self.0.iter().map(Feature::as_str).collect();
        serde_json::Value::from(names).to_string()
    }
}

impl TryFrom<String> for FeatureList {
    type Error = serde_json::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        serde_json::from_str(&value)
    }
}

/// Free-form JSON object column.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct JsonText(pub Value);

impl TryFrom<String> for JsonText {
    type Error = serde_json::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        serde_json::from_str(&value).map(JsonText)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: Option<String>,
    #[sqlx(try_from = "String")]
    pub role: Role,
    #[serde(skip)]
    pub api_key_hash: String,
    pub plan_id: Option<i64>,
    pub plan_expires_at: Option<DateTime<Utc>>,
    pub credits: i64,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, FromRow)]
pub struct Plan {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub price: i64,
    pub currency: String,
    #[sqlx(try_from = "String")]
    pub interval: BillingInterval,
    #[sqlx(try_from = "String")]
    pub features: FeatureList,
    pub audit_limit: Option<i64>,
    pub gateway_plan_id: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq, FromRow)]
pub struct CreditPackage {
    pub id: i64,
    pub name: String,
    pub credits: i64,
    pub price: i64,
    pub currency: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq, FromRow)]
pub struct Alert {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub url: Option<String>,
    #[sqlx(try_from = "String")]
    pub metric: AlertMetric,
    #[sqlx(try_from = "String")]
    pub comparison: Comparison,
    pub threshold: f64,
    pub enabled: bool,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq, FromRow)]
pub struct Audit {
    pub id: i64,
    pub user_id: i64,
    pub url: String,
    #[sqlx(try_from = "String")]
    pub kind: AuditKind,
    pub score: Option<f64>,
    #[sqlx(try_from = "String")]
    pub summary: JsonText,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq, FromRow)]
pub struct Payment {
    pub id: i64,
    pub user_id: i64,
    #[sqlx(try_from = "String")]
    pub kind: PaymentKind,
    pub gateway_order_id: Option<String>,
    pub gateway_subscription_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    /// Credits granted on capture; zero for subscriptions.
    pub credits: i64,
    #[sqlx(try_from = "String")]
    pub status: PaymentStatus,
    pub credit_package_id: Option<i64>,
    pub plan_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One checked link destined for `link_results`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewLinkResult {
    pub url: String,
    pub status: Option<u16>,
    pub error: Option<String>,
}

/// Outcome of a best-effort batch insert.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct BatchOutcome {
    pub inserted: usize,
    pub failed: usize,
    pub last_error: Option<String>,
}
