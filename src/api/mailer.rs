use crate::config::SmtpConfig;
use crate::error::AuditError;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: Option<String>,
}

/// Transactional email sink.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<(), AuditError>;
}

pub fn parse_mailbox(address: &str) -> Result<Mailbox, AuditError> {
    address
        .trim()
        .parse::<Mailbox>()
        .map_err(|e| AuditError::validation(format!("invalid email address `{address}`: {e}")))
}

/// STARTTLS relay described by `[smtp]`.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// `None` when no SMTP host is configured.
    pub fn from_config(cfg: &SmtpConfig) -> Result<Option<Self>, AuditError> {
        let Some(host) = cfg.host.as_deref().filter(|h| !h.is_empty()) else {
            return Ok(None);
        };
        let from = parse_mailbox(&cfg.from)?;
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| AuditError::Email(e.to_string()))?
            .port(cfg.port);
        if !cfg.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                cfg.username.clone(),
                cfg.password.clone(),
            ));
        }
        Ok(Some(Self {
            transport: builder.build(),
            from,
        }))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), AuditError> {
        let to = parse_mailbox(&email.to)?;
        let builder = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject.as_str());
        let message = match email.html {
            Some(html) => builder.multipart(MultiPart::alternative_plain_html(email.text, html)),
            None => builder.header(ContentType::TEXT_PLAIN).body(email.text),
        }
        .map_err(|e| AuditError::Email(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| AuditError::Email(e.to_string()))?;
        info!(to = %email.to, subject = %email.subject, "email sent");
        Ok(())
    }
}
