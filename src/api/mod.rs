//! Clients for the external collaborators: one type per upstream.

pub mod gemini_api;
pub mod mailer;
pub mod pagespeed_api;
pub mod payment_gateway;
pub mod scraper_api;

pub use gemini_api::GeminiApi;
pub use mailer::{Mailer, OutgoingEmail, SmtpMailer};
pub use pagespeed_api::PageSpeedApi;
pub use payment_gateway::PaymentGateway;
pub use scraper_api::ScraperApi;
