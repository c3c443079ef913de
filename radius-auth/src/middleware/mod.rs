pub mod auth;
pub mod context;

pub use auth::{authentication_middleware, require, AuthUser, MaybeAuthUser};
pub use context::{api_request_middleware, capture_request_context, request_context_middleware};
