use crate::db::models::{Alert, AlertMetric, Comparison};
use crate::db::sqlite::Storage;
use crate::error::AuditError;
use chrono::{DateTime, Utc};

/// Validated alert fields, shared by create and update.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertDraft {
    pub name: String,
    pub url: Option<String>,
    pub metric: AlertMetric,
    pub comparison: Comparison,
    pub threshold: f64,
    pub enabled: bool,
}

impl Storage {
    pub async fn list_alerts(&self, user_id: i64) -> Result<Vec<Alert>, AuditError> {
        let alerts = sqlx::query_as::<_, Alert>(
            "SELECT * FROM alerts WHERE user_id = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;
        Ok(alerts)
    }

    /// Alerts are scoped to their owner; another user's id reads as missing.
    pub async fn get_alert(&self, user_id: i64, id: i64) -> Result<Alert, AuditError> {
        sqlx::query_as::<_, Alert>("SELECT * FROM alerts WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .fetch_optional(self.pool())
            .await?
            .ok_or(AuditError::NotFound("alert"))
    }

    pub async fn create_alert(&self, user_id: i64, draft: &AlertDraft) -> Result<Alert, AuditError> {
        let now = Utc::now();
        let alert = sqlx::query_as::<_, Alert>(
            r#"INSERT INTO alerts (
                   user_id, name, url, metric, comparison, threshold, enabled, created_at, updated_at
               ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
               RETURNING *"#,
        )
        .bind(user_id)
        .bind(&draft.name)
        .bind(&draft.url)
        .bind(draft.metric.as_str())
        .bind(draft.comparison.as_str())
        .bind(draft.threshold)
        .bind(draft.enabled)
        .bind(now)
        .bind(now)
        .fetch_one(self.pool())
        .await?;
        Ok(alert)
    }

    pub async fn update_alert(
        &self,
        user_id: i64,
        id: i64,
        draft: &AlertDraft,
    ) -> Result<Alert, AuditError> {
        sqlx::query_as::<_, Alert>(
            r#"UPDATE alerts SET
                   name = ?, url = ?, metric = ?, comparison = ?, threshold = ?, enabled = ?,
                   updated_at = ?
               WHERE id = ? AND user_id = ?
               RETURNING *"#,
        )
        .bind(&draft.name)
        .bind(&draft.url)
        .bind(draft.metric.as_str())
        .bind(draft.comparison.as_str())
        .bind(draft.threshold)
        .bind(draft.enabled)
        .bind(Utc::now())
        .bind(id)
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?
        .ok_or(AuditError::NotFound("alert"))
    }

    pub async fn delete_alert(&self, user_id: i64, id: i64) -> Result<(), AuditError> {
        let res = sqlx::query("DELETE FROM alerts WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(self.pool())
            .await?;
        if res.rows_affected() == 0 {
            return Err(AuditError::NotFound("alert"));
        }
        Ok(())
    }

    pub async fn list_enabled_alerts(
        &self,
        user_id: i64,
        metric: AlertMetric,
    ) -> Result<Vec<Alert>, AuditError> {
        let alerts = sqlx::query_as::<_, Alert>(
            "SELECT * FROM alerts WHERE user_id = ? AND metric = ? AND enabled = 1 ORDER BY id",
        )
        .bind(user_id)
        .bind(metric.as_str())
        .fetch_all(self.pool())
        .await?;
        Ok(alerts)
    }

    pub async fn mark_alert_triggered(&self, id: i64, at: DateTime<Utc>) -> Result<(), AuditError> {
        sqlx::query("UPDATE alerts SET last_triggered_at = ? WHERE id = ?")
            .bind(at)
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn count_active_alerts(&self, user_id: i64) -> Result<i64, AuditError> {
        let rec: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM alerts WHERE user_id = ? AND enabled = 1")
                .bind(user_id)
                .fetch_one(self.pool())
                .await?;
        Ok(rec.0)
    }

    pub async fn recently_triggered_alerts(
        &self,
        user_id: i64,
        limit: i64,
    ) -> Result<Vec<Alert>, AuditError> {
        let alerts = sqlx::query_as::<_, Alert>(
            r#"SELECT * FROM alerts
               WHERE user_id = ? AND last_triggered_at IS NOT NULL
               ORDER BY last_triggered_at DESC
               LIMIT ?"#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(alerts)
    }
}
