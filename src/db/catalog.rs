use crate::db::models::{BillingInterval, CreditPackage, FeatureList, Plan};
use crate::db::sqlite::{Storage, conflict_on_unique};
use crate::error::AuditError;
use chrono::Utc;

/// Validated plan fields, shared by create and update.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanDraft {
    pub name: String,
    pub description: String,
    pub price: i64,
    pub currency: String,
    pub interval: BillingInterval,
    pub features: FeatureList,
    pub audit_limit: Option<i64>,
    pub gateway_plan_id: Option<String>,
    pub is_active: bool,
}

/// Validated credit package fields, shared by create and update.
#[derive(Debug, Clone, PartialEq)]
pub struct CreditPackageDraft {
    pub name: String,
    pub credits: i64,
    pub price: i64,
    pub currency: String,
    pub is_active: bool,
}

const DUPLICATE_PLAN: &str = "a plan with this name already exists";

impl Storage {
    pub async fn list_plans(&self, active_only: bool) -> Result<Vec<Plan>, AuditError> {
        let sql = if active_only {
            "SELECT * FROM plans WHERE is_active = 1 ORDER BY price, id"
        } else {
            "SELECT * FROM plans ORDER BY price, id"
        };
        let plans = sqlx::query_as::<_, Plan>(sql).fetch_all(self.pool()).await?;
        Ok(plans)
    }

    pub async fn get_plan(&self, id: i64) -> Result<Plan, AuditError> {
        sqlx::query_as::<_, Plan>("SELECT * FROM plans WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or(AuditError::NotFound("plan"))
    }

    pub async fn create_plan(&self, draft: &PlanDraft) -> Result<Plan, AuditError> {
        let now = Utc::now();
        sqlx::query_as::<_, Plan>(
            r#"INSERT INTO plans (
                   name, description, price, currency, interval, features,
                   audit_limit, gateway_plan_id, is_active, created_at, updated_at
               ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               RETURNING *"#,
        )
        .bind(&draft.name)
        .bind(&draft.description)
        .bind(draft.price)
        .bind(&draft.currency)
        .bind(draft.interval.as_str())
        .bind(draft.features.to_json())
        .bind(draft.audit_limit)
        .bind(&draft.gateway_plan_id)
        .bind(draft.is_active)
        .bind(now)
        .bind(now)
        .fetch_one(self.pool())
        .await
        .map_err(|e| conflict_on_unique(e, DUPLICATE_PLAN))
    }

    pub async fn update_plan(&self, id: i64, draft: &PlanDraft) -> Result<Plan, AuditError> {
        sqlx::query_as::<_, Plan>(
            r#"UPDATE plans SET
                   name = ?, description = ?, price = ?, currency = ?, interval = ?,
                   features = ?, audit_limit = ?, gateway_plan_id = ?, is_active = ?,
                   updated_at = ?
               WHERE id = ?
               RETURNING *"#,
        )
        .bind(&draft.name)
        .bind(&draft.description)
        .bind(draft.price)
        .bind(&draft.currency)
        .bind(draft.interval.as_str())
        .bind(draft.features.to_json())
        .bind(draft.audit_limit)
        .bind(&draft.gateway_plan_id)
        .bind(draft.is_active)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| conflict_on_unique(e, DUPLICATE_PLAN))?
        .ok_or(AuditError::NotFound("plan"))
    }

    pub async fn delete_plan(&self, id: i64) -> Result<(), AuditError> {
        let res = sqlx::query("DELETE FROM plans WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;
        if res.rows_affected() == 0 {
            return Err(AuditError::NotFound("plan"));
        }
        Ok(())
    }

    pub async fn list_credit_packages(
        &self,
        active_only: bool,
    ) -> Result<Vec<CreditPackage>, AuditError> {
        let sql = if active_only {
            "SELECT * FROM credit_packages WHERE is_active = 1 ORDER BY price, id"
        } else {
            "SELECT * FROM credit_packages ORDER BY price, id"
        };
        let packages = sqlx::query_as::<_, CreditPackage>(sql)
            .fetch_all(self.pool())
            .await?;
        Ok(packages)
    }

    pub async fn get_credit_package(&self, id: i64) -> Result<CreditPackage, AuditError> {
        sqlx::query_as::<_, CreditPackage>("SELECT * FROM credit_packages WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or(AuditError::NotFound("credit package"))
    }

    pub async fn create_credit_package(
        &self,
        draft: &CreditPackageDraft,
    ) -> Result<CreditPackage, AuditError> {
        let now = Utc::now();
        let package = sqlx::query_as::<_, CreditPackage>(
            r#"INSERT INTO credit_packages (name, credits, price, currency, is_active, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)
               RETURNING *"#,
        )
        .bind(&draft.name)
        .bind(draft.credits)
        .bind(draft.price)
        .bind(&draft.currency)
        .bind(draft.is_active)
        .bind(now)
        .bind(now)
        .fetch_one(self.pool())
        .await?;
        Ok(package)
    }

    pub async fn update_credit_package(
        &self,
        id: i64,
        draft: &CreditPackageDraft,
    ) -> Result<CreditPackage, AuditError> {
        sqlx::query_as::<_, CreditPackage>(
            r#"UPDATE credit_packages SET
                   name = ?, credits = ?, price = ?, currency = ?, is_active = ?, updated_at = ?
               WHERE id = ?
               RETURNING *"#,
        )
        .bind(&draft.name)
        .bind(draft.credits)
        .bind(draft.price)
        .bind(&draft.currency)
        .bind(draft.is_active)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(self.pool())
        .await?
        .ok_or(AuditError::NotFound("credit package"))
    }

    pub async fn delete_credit_package(&self, id: i64) -> Result<(), AuditError> {
        let res = sqlx::query("DELETE FROM credit_packages WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;
        if res.rows_affected() == 0 {
            return Err(AuditError::NotFound("credit package"));
        }
        Ok(())
    }
}
