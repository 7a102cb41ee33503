use crate::db::models::{Payment, PaymentKind, PaymentStatus};
use crate::db::sqlite::Storage;
use crate::error::AuditError;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub user_id: i64,
    pub kind: PaymentKind,
    pub gateway_order_id: Option<String>,
    pub gateway_subscription_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub credits: i64,
    pub credit_package_id: Option<i64>,
    pub plan_id: Option<i64>,
}

impl Storage {
    pub async fn create_payment(&self, new: &NewPayment) -> Result<Payment, AuditError> {
        let now = Utc::now();
        let payment = sqlx::query_as::<_, Payment>(
            r#"INSERT INTO payments (
                   user_id, kind, gateway_order_id, gateway_subscription_id, amount, currency,
                   credits, status, credit_package_id, plan_id, created_at, updated_at
               ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               RETURNING *"#,
        )
        .bind(new.user_id)
        .bind(new.kind.as_str())
        .bind(&new.gateway_order_id)
        .bind(&new.gateway_subscription_id)
        .bind(new.amount)
        .bind(&new.currency)
        .bind(new.credits)
        .bind(PaymentStatus::Created.as_str())
        .bind(new.credit_package_id)
        .bind(new.plan_id)
        .bind(now)
        .bind(now)
        .fetch_one(self.pool())
        .await?;
        Ok(payment)
    }

    pub async fn find_payment_by_order(&self, order_id: &str) -> Result<Option<Payment>, AuditError> {
        let payment =
            sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE gateway_order_id = ?")
                .bind(order_id)
                .fetch_optional(self.pool())
                .await?;
        Ok(payment)
    }

    pub async fn find_payment_by_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<Payment>, AuditError> {
        let payment = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE gateway_subscription_id = ?",
        )
        .bind(subscription_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(payment)
    }

    pub async fn list_payments(&self, user_id: i64) -> Result<Vec<Payment>, AuditError> {
        let payments = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE user_id = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;
        Ok(payments)
    }

    pub async fn list_all_payments(&self) -> Result<Vec<Payment>, AuditError> {
        let payments =
            sqlx::query_as::<_, Payment>("SELECT * FROM payments ORDER BY created_at DESC, id DESC")
                .fetch_all(self.pool())
                .await?;
        Ok(payments)
    }

    pub async fn recent_payments(&self, user_id: i64, limit: i64) -> Result<Vec<Payment>, AuditError> {
        let payments = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE user_id = ? ORDER BY updated_at DESC, id DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(payments)
    }

    pub async fn set_payment_status(
        &self,
        id: i64,
        status: PaymentStatus,
        gateway_payment_id: Option<&str>,
    ) -> Result<(), AuditError> {
        sqlx::query(
            r#"UPDATE payments
               SET status = ?, gateway_payment_id = COALESCE(?, gateway_payment_id), updated_at = ?
               WHERE id = ?"#,
        )
        .bind(status.as_str())
        .bind(gateway_payment_id)
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Capture a one-off payment and grant its credits in one transaction.
    /// Returns `false` when the payment was already captured.
    pub async fn capture_credit_payment(
        &self,
        payment: &Payment,
        gateway_payment_id: &str,
    ) -> Result<bool, AuditError> {
        let mut tx = self.pool().begin().await?;
        let res = sqlx::query(
            r#"UPDATE payments
               SET status = ?, gateway_payment_id = ?, updated_at = ?
               WHERE id = ? AND status != ?"#,
        )
        .bind(PaymentStatus::Captured.as_str())
        .bind(gateway_payment_id)
        .bind(Utc::now())
        .bind(payment.id)
        .bind(PaymentStatus::Captured.as_str())
        .execute(&mut *tx)
        .await?;
        if res.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }
        if payment.credits > 0 {
            sqlx::query("UPDATE users SET credits = credits + ? WHERE id = ?")
                .bind(payment.credits)
                .bind(payment.user_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(true)
    }

    /// Mark a subscription payment captured and move the user onto its plan.
    pub async fn activate_subscription(
        &self,
        payment: &Payment,
        gateway_payment_id: Option<&str>,
        plan_id: i64,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), AuditError> {
        let mut tx = self.pool().begin().await?;
        sqlx::query(
            r#"UPDATE payments
               SET status = ?, gateway_payment_id = COALESCE(?, gateway_payment_id), updated_at = ?
               WHERE id = ?"#,
        )
        .bind(PaymentStatus::Captured.as_str())
        .bind(gateway_payment_id)
        .bind(Utc::now())
        .bind(payment.id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("UPDATE users SET plan_id = ?, plan_expires_at = ? WHERE id = ?")
            .bind(plan_id)
            .bind(expires_at)
            .bind(payment.user_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Mark a subscription payment cancelled and expire the user's plan, but only
    /// while that plan is still the one this subscription paid for.
    /// Returns `true` when the user's plan was expired.
    pub async fn end_subscription(
        &self,
        payment: &Payment,
        plan_id: i64,
        at: DateTime<Utc>,
    ) -> Result<bool, AuditError> {
        let mut tx = self.pool().begin().await?;
        sqlx::query("UPDATE payments SET status = ?, updated_at = ? WHERE id = ?")
            .bind(PaymentStatus::Cancelled.as_str())
            .bind(at)
            .bind(payment.id)
            .execute(&mut *tx)
            .await?;
        let res = sqlx::query("UPDATE users SET plan_expires_at = ? WHERE id = ? AND plan_id = ?")
            .bind(at)
            .bind(payment.user_id)
            .bind(plan_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(res.rows_affected() > 0)
    }

    /// Sum of captured amounts per currency.
    pub async fn captured_revenue(&self) -> Result<Vec<(String, i64)>, AuditError> {
        let rows = sqlx::query_as(
            r#"SELECT currency, COALESCE(SUM(amount), 0) FROM payments
               WHERE status = ?
               GROUP BY currency
               ORDER BY currency"#,
        )
        .bind(PaymentStatus::Captured.as_str())
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }
}
