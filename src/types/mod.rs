pub mod analysis;
pub mod envelope;
pub mod gemini;
pub mod pagespeed;
pub mod payments;
pub mod text_enum;

pub use envelope::Envelope;
