use crate::db::models::{Role, User};
use crate::db::schema::SQLITE_INIT;
use crate::error::AuditError;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use std::time::Duration;

pub type SqlitePool = Pool<Sqlite>;

#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) the database at `database_url` and apply the schema.
    pub async fn connect(database_url: &str) -> Result<Self, AuditError> {
        let connect_opts = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(connect_opts)
            .await?;
        let storage = Self::new(pool);
        storage.init_schema().await?;
        Ok(storage)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Initialize the schema by executing the bundled DDL.
    pub async fn init_schema(&self) -> Result<(), AuditError> {
        // sqlx::query runs one statement at a time
        for stmt in SQLITE_INIT.split(';') {
            let s = stmt.trim();
            if s.is_empty() {
                continue;
            }
            sqlx::query(s).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub async fn create_user(
        &self,
        email: &str,
        name: Option<&str>,
        role: Role,
        api_key_hash: &str,
    ) -> Result<User, AuditError> {
        sqlx::query_as::<_, User>(
            r#"INSERT INTO users (email, name, role, api_key_hash, credits, created_at)
               VALUES (?, ?, ?, ?, 0, ?)
               RETURNING *"#,
        )
        .bind(email)
        .bind(name)
        .bind(role.as_str())
        .bind(api_key_hash)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "a user with this email already exists"))
    }

    pub async fn find_user_by_key_hash(&self, hash: &str) -> Result<Option<User>, AuditError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE api_key_hash = ?")
            .bind(hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn get_user(&self, id: i64) -> Result<User, AuditError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AuditError::NotFound("user"))
    }

    pub async fn list_users(&self) -> Result<Vec<User>, AuditError> {
        let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    pub async fn count_users(&self) -> Result<i64, AuditError> {
        let rec: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(rec.0)
    }

    pub async fn add_credits(&self, id: i64, amount: i64) -> Result<User, AuditError> {
        sqlx::query_as::<_, User>(
            "UPDATE users SET credits = credits + ? WHERE id = ? RETURNING *",
        )
        .bind(amount)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AuditError::NotFound("user"))
    }

    /// Take one credit if the user has any. Returns whether a credit was consumed.
    pub async fn consume_credit(&self, id: i64) -> Result<bool, AuditError> {
        let res = sqlx::query("UPDATE users SET credits = credits - 1 WHERE id = ? AND credits > 0")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() == 1)
    }

    pub async fn set_user_plan(
        &self,
        id: i64,
        plan_id: Option<i64>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), AuditError> {
        sqlx::query("UPDATE users SET plan_id = ?, plan_expires_at = ? WHERE id = ?")
            .bind(plan_id)
            .bind(expires_at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Turn a unique-constraint violation into a 409, anything else into a database error.
pub(crate) fn conflict_on_unique(err: sqlx::Error, message: &str) -> AuditError {
    let is_unique = err
        .as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false);
    if is_unique {
        AuditError::Conflict(message.to_string())
    } else {
        AuditError::DatabaseError(err)
    }
}
