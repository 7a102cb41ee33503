use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, request::Parts};
use headers::authorization::Bearer;
use headers::{Authorization, HeaderMapExt};
use subtle::ConstantTimeEq;

use crate::db::models::User;
use crate::error::AuditError;
use crate::router::AppState;
use crate::service::api_keys::hash_api_key;

/// Pull the presented key from the request.
/// Accepts either:
/// - Header: `Authorization: Bearer <key>`
/// - Header: `x-api-key: <key>`
pub fn presented_key(headers: &HeaderMap) -> Option<String> {
    if let Some(Authorization(bearer)) = headers.typed_get::<Authorization<Bearer>>() {
        let token = bearer.token().trim();
        if !token.is_empty() {
            return Some(token.to_string());
        }
    }
    headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
}

async fn lookup_user(state: &AppState, key: &str) -> Result<User, AuditError> {
    state
        .storage
        .find_user_by_key_hash(&hash_api_key(key))
        .await?
        .ok_or(AuditError::Unauthorized)
}

/// Caller identified by a personal API key.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AuditError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let key = presented_key(&parts.headers).ok_or(AuditError::Unauthorized)?;
        Ok(Self(lookup_user(state, &key).await?))
    }
}

/// Administrator: the configured admin key, or a user whose role is `admin`.
#[derive(Debug, Clone)]
pub struct AdminUser(pub Option<User>);

fn is_admin_key(expected: &str, presented: &str) -> bool {
    !expected.is_empty() && bool::from(presented.as_bytes().ct_eq(expected.as_bytes()))
}

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AuditError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let key = presented_key(&parts.headers).ok_or(AuditError::Unauthorized)?;
        if is_admin_key(&state.config.basic.admin_key, &key) {
            return Ok(Self(None));
        }
        let user = lookup_user(state, &key).await?;
        if !user.is_admin() {
            return Err(AuditError::Forbidden("admin access required".to_string()));
        }
        Ok(Self(Some(user)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_wins_over_api_key_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("header-key"));
        assert_eq!(presented_key(&headers).as_deref(), Some("header-key"));
        headers.insert("authorization", HeaderValue::from_static("Bearer bearer-key"));
        assert_eq!(presented_key(&headers).as_deref(), Some("bearer-key"));
    }

    #[test]
    fn blank_credentials_are_absent() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic dXNlcjpwYXNz"));
        headers.insert("x-api-key", HeaderValue::from_static("  "));
        assert_eq!(presented_key(&headers), None);
    }

    #[test]
    fn empty_admin_key_never_matches() {
        assert!(!is_admin_key("", ""));
        assert!(is_admin_key("s3cret", "s3cret"));
        assert!(!is_admin_key("s3cret", "s3cre"));
    }
}
