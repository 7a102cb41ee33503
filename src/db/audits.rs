use crate::db::models::{Audit, AuditKind, BatchOutcome, NewLinkResult};
use crate::db::sqlite::Storage;
use crate::error::AuditError;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;

impl Storage {
    pub async fn record_audit(
        &self,
        user_id: i64,
        url: &str,
        kind: AuditKind,
        score: Option<f64>,
        summary: &Value,
    ) -> Result<Audit, AuditError> {
        let audit = sqlx::query_as::<_, Audit>(
            r#"INSERT INTO audits (user_id, url, kind, score, summary, created_at)
               VALUES (?, ?, ?, ?, ?, ?)
               RETURNING *"#,
        )
        .bind(user_id)
        .bind(url)
        .bind(kind.as_str())
        .bind(score)
        .bind(summary.to_string())
        .bind(Utc::now())
        .fetch_one(self.pool())
        .await?;
        Ok(audit)
    }

    /// Insert rows one by one; a failing row is skipped and the last failure reported.
    pub async fn insert_link_results(
        &self,
        audit_id: i64,
        rows: &[NewLinkResult],
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for row in rows {
            let res = sqlx::query(
                "INSERT INTO link_results (audit_id, url, status, error) VALUES (?, ?, ?, ?)",
            )
            .bind(audit_id)
            .bind(&row.url)
            .bind(row.status.map(i64::from))
            .bind(&row.error)
            .execute(self.pool())
            .await;
            match res {
                Ok(_) => outcome.inserted += 1,
                Err(e) => {
                    warn!(audit_id, url = %row.url, error = %e, "link result insert failed");
                    outcome.failed += 1;
                    outcome.last_error = Some(e.to_string());
                }
            }
        }
        outcome
    }

    pub async fn list_link_results(&self, audit_id: i64) -> Result<Vec<NewLinkResult>, AuditError> {
        let rows: Vec<(String, Option<i64>, Option<String>)> = sqlx::query_as(
            "SELECT url, status, error FROM link_results WHERE audit_id = ? ORDER BY id",
        )
        .bind(audit_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows
            .into_iter()
            .map(|(url, status, error)| NewLinkResult {
                url,
                status: status.and_then(|s| u16::try_from(s).ok()),
                error,
            })
            .collect())
    }

    pub async fn count_audits(&self, user_id: i64) -> Result<i64, AuditError> {
        let rec: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM audits WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(self.pool())
            .await?;
        Ok(rec.0)
    }

    pub async fn count_audits_since(
        &self,
        user_id: i64,
        since: DateTime<Utc>,
    ) -> Result<i64, AuditError> {
        let rec: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM audits WHERE user_id = ? AND created_at >= ?")
                .bind(user_id)
                .bind(since)
                .fetch_one(self.pool())
                .await?;
        Ok(rec.0)
    }

    pub async fn count_all_audits(&self) -> Result<i64, AuditError> {
        let rec: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM audits")
            .fetch_one(self.pool())
            .await?;
        Ok(rec.0)
    }

    pub async fn average_score(&self, user_id: i64) -> Result<Option<f64>, AuditError> {
        let rec: (Option<f64>,) =
            sqlx::query_as("SELECT AVG(score) FROM audits WHERE user_id = ? AND score IS NOT NULL")
                .bind(user_id)
                .fetch_one(self.pool())
                .await?;
        Ok(rec.0)
    }

    pub async fn recent_audits(&self, user_id: i64, limit: i64) -> Result<Vec<Audit>, AuditError> {
        let audits = sqlx::query_as::<_, Audit>(
            "SELECT * FROM audits WHERE user_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(audits)
    }

    /// Timestamps and scores of a user's audits since `since`, oldest first.
    pub async fn audit_points_since(
        &self,
        user_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<(DateTime<Utc>, Option<f64>)>, AuditError> {
        let rows = sqlx::query_as(
            r#"SELECT created_at, score FROM audits
               WHERE user_id = ? AND created_at >= ?
               ORDER BY created_at"#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }
}
