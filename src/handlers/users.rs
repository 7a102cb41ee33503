use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use crate::api::mailer::parse_mailbox;
use crate::db::models::{Role, User};
use crate::error::AuditError;
use crate::handlers::positive;
use crate::middleware::{AdminUser, AuthUser, JsonBody};
use crate::router::AppState;
use crate::service::api_keys::{generate_api_key, hash_api_key};
use crate::types::Envelope;

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn me(AuthUser(user): AuthUser) -> Json<Envelope<User>> {
    Envelope::ok(user)
}

pub async fn list(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> Result<Json<Envelope<Vec<User>>>, AuditError> {
    Ok(Envelope::ok(state.storage.list_users().await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Debug, Serialize)]
pub struct CreatedUser {
    pub user: User,
    /// Shown once; only its hash is stored.
    pub api_key: String,
}

pub async fn create(
    _admin: AdminUser,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<CreateUserRequest>,
) -> Result<impl IntoResponse, AuditError> {
    let mailbox = parse_mailbox(&req.email)?;
    let email = mailbox.email.to_string();
    let name = req.name.as_deref().map(str::trim).filter(|n| !n.is_empty());
    let role = req.role.unwrap_or(Role::User);

    let api_key = generate_api_key();
    let user = state
        .storage
        .create_user(&email, name, role, &hash_api_key(&api_key))
        .await?;
    info!(user_id = user.id, role = %user.role, "user created");
    Ok((StatusCode::CREATED, Envelope::ok(CreatedUser { user, api_key })))
}

#[derive(Debug, Deserialize)]
pub struct GrantCreditsRequest {
    pub amount: i64,
}

pub async fn grant_credits(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    JsonBody(req): JsonBody<GrantCreditsRequest>,
) -> Result<Json<Envelope<User>>, AuditError> {
    let amount = positive("amount", req.amount)?;
    let user = state.storage.add_credits(id, amount).await?;
    info!(user_id = id, amount, balance = user.credits, "credits granted");
    Ok(Envelope::ok(user))
}
