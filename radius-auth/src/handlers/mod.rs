pub mod auth;
pub mod authz;
pub mod totp;

pub use auth::{logout, me, refresh, revoke_token};
pub use authz::evaluate;
pub use totp::{enroll, verify};
