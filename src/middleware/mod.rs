pub mod auth;
pub mod body;

pub use auth::{AdminUser, AuthUser};
pub use body::{JsonBody, RawBody};
