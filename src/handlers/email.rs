use axum::{Json, extract::State};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::api::OutgoingEmail;
use crate::api::mailer::parse_mailbox;
use crate::error::AuditError;
use crate::handlers::required_text;
use crate::middleware::{AdminUser, JsonBody};
use crate::router::AppState;
use crate::types::Envelope;

#[derive(Debug, Deserialize)]
pub struct SendEmailRequest {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: Option<String>,
}

impl SendEmailRequest {
    pub fn into_email(self) -> Result<OutgoingEmail, AuditError> {
        let to = parse_mailbox(&self.to)?;
        Ok(OutgoingEmail {
            to: to.to_string(),
            subject: required_text("subject", &self.subject)?,
            text: required_text("text", &self.text)?,
            html: self.html.filter(|h| !h.trim().is_empty()),
        })
    }
}

pub async fn send(
    _admin: AdminUser,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<SendEmailRequest>,
) -> Result<Json<Envelope<Value>>, AuditError> {
    let email = req.into_email()?;
    let mailer = state.mailer.as_ref().ok_or(AuditError::EmailNotConfigured)?;
    let to = email.to.clone();
    mailer.send(email).await?;
    Ok(Envelope::ok(json!({ "sent": true, "to": to })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipient_must_be_a_mailbox() {
        let req = SendEmailRequest {
            to: "not an address".into(),
            subject: "Hi".into(),
            text: "Body".into(),
            html: None,
        };
        assert!(matches!(req.into_email(), Err(AuditError::Validation(_))));
    }

    #[test]
    fn blank_html_is_dropped() {
        let req = SendEmailRequest {
            to: "Ops <ops@example.com>".into(),
            subject: "Weekly report".into(),
            text: "All green".into(),
            html: Some("  ".into()),
        };
        let email = req.into_email().unwrap();
        assert_eq!(email.html, None);
        assert!(email.to.contains("ops@example.com"));
    }
}
