//! Database module: models, schema and queries for persistent storage.
//!
//! Layout:
//! - `models.rs`: Rust structs mirroring DB rows
//! - `schema.rs`: SQL DDL for initializing the database (SQLite-first)
//! - `sqlite.rs`: pool setup and user queries
//! - `catalog.rs`, `alerts.rs`, `audits.rs`, `payments.rs`: per-entity queries

pub mod alerts;
pub mod audits;
pub mod catalog;
pub mod models;
pub mod payments;
pub mod schema;
pub mod sqlite;

pub use models::{
    Alert, AlertMetric, Audit, AuditKind, BatchOutcome, BillingInterval, Comparison,
    CreditPackage, FeatureList, JsonText, NewLinkResult, Payment, PaymentKind, PaymentStatus,
    Plan, Role, User,
};
pub use alerts::AlertDraft;
pub use catalog::{CreditPackageDraft, PlanDraft};
pub use payments::NewPayment;
pub use schema::SQLITE_INIT;
pub use sqlite::{SqlitePool, Storage};
