//! SQL DDL for initializing the application database.
//! SQLite-first design; every statement is idempotent.

/// SQLite schema. Timestamps are RFC3339 text, JSON columns are serialized text,
/// booleans are INTEGER 0/1.
pub const SQLITE_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS plans (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL DEFAULT '',
    price INTEGER NOT NULL,
    currency TEXT NOT NULL,
    interval TEXT NOT NULL,
    features TEXT NOT NULL DEFAULT '[]', -- JSON array of feature names
    audit_limit INTEGER NULL,
    gateway_plan_id TEXT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    email TEXT NOT NULL UNIQUE,
    name TEXT NULL,
    role TEXT NOT NULL DEFAULT 'user',
    api_key_hash TEXT NOT NULL UNIQUE,
    plan_id INTEGER NULL REFERENCES plans(id) ON DELETE SET NULL,
    plan_expires_at TEXT NULL,
    credits INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS credit_packages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    credits INTEGER NOT NULL,
    price INTEGER NOT NULL,
    currency TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS alerts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    url TEXT NULL,
    metric TEXT NOT NULL,
    comparison TEXT NOT NULL,
    threshold REAL NOT NULL,
    enabled INTEGER NOT NULL DEFAULT 1,
    last_triggered_at TEXT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS audits (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    url TEXT NOT NULL,
    kind TEXT NOT NULL,
    score REAL NULL,
    summary TEXT NOT NULL DEFAULT '{}', -- JSON object
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS link_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    audit_id INTEGER NOT NULL REFERENCES audits(id) ON DELETE CASCADE,
    url TEXT NOT NULL CHECK (length(url) > 0),
    status INTEGER NULL,
    error TEXT NULL
);

CREATE TABLE IF NOT EXISTS payments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    kind TEXT NOT NULL,
    gateway_order_id TEXT NULL UNIQUE,
    gateway_subscription_id TEXT NULL UNIQUE,
    gateway_payment_id TEXT NULL,
    amount INTEGER NOT NULL,
    currency TEXT NOT NULL,
    credits INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'created',
    credit_package_id INTEGER NULL REFERENCES credit_packages(id) ON DELETE SET NULL,
    plan_id INTEGER NULL REFERENCES plans(id) ON DELETE SET NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_alerts_user_id ON alerts(user_id);
CREATE INDEX IF NOT EXISTS idx_audits_user_created ON audits(user_id, created_at);
CREATE INDEX IF NOT EXISTS idx_payments_user_id ON payments(user_id);
"#;
